//! Handler types for the three chain flavors.
//!
//! | Flavor  | Handler            | Input           | Output                           |
//! |---------|--------------------|-----------------|----------------------------------|
//! | plain   | [`Handler`]        | [`Message`]     | `()`                             |
//! | context | [`ContextHandler`] | [`Request`]     | `Result<(), HandlerError>`       |
//! | micro   | [`MicroHandler`]   | [`MicroRequest`]| `Result<MicroReply, HandlerError>` |
//!
//! Plain handlers reply through the message themselves. Context handlers do
//! too, but a returned error is reported to the caller automatically. Micro
//! handlers return the reply and never touch the transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use micromw_core::HandlerError;

use crate::message::{MicroReply, MicroRequest};
use crate::request::Request;
use crate::transport::Message;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler that receives the raw transport message.
pub type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// A handler that receives a context-carrying [`Request`].
pub type ContextHandler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A handler that maps a [`MicroRequest`] to a [`MicroReply`].
pub type MicroHandler =
    Arc<dyn Fn(MicroRequest) -> BoxFuture<'static, Result<MicroReply, HandlerError>> + Send + Sync>;

/// Create a [`Handler`] from an async function.
///
/// # Example
///
/// ```ignore
/// let echo = handler_fn(|msg: Message| async move {
///     let _ = msg.respond(msg.data().clone(), Headers::new());
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg: Message| -> BoxFuture<'static, ()> { Box::pin(f(msg)) })
}

/// Create a [`ContextHandler`] from an async function.
pub fn context_handler_fn<F, Fut>(f: F) -> ContextHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
        Box::pin(f(req))
    })
}

/// Create a [`MicroHandler`] from an async function.
///
/// # Example
///
/// ```ignore
/// let echo = micro_handler_fn(|req: MicroRequest| async move {
///     Ok(MicroReply::new(req.data))
/// });
/// ```
pub fn micro_handler_fn<F, Fut>(f: F) -> MicroHandler
where
    F: Fn(MicroRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<MicroReply, HandlerError>> + Send + 'static,
{
    Arc::new(
        move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
            Box::pin(f(req))
        },
    )
}
