//! # micromw
//!
//! Middleware chains for request-reply micro-services.
//!
//! A service author registers handlers on a [`Service`]; the service wraps
//! each handler in an ordered chain of middleware before handing it to the
//! messaging [`Substrate`]. The first middleware registered is the outermost:
//! it sees the request first and the result last.
//!
//! ## Handler flavors
//!
//! - **plain** ([`Handler`]): receives the raw [`Message`] and replies through it.
//! - **context** ([`ContextHandler`]): receives a [`Request`] carrying a typed
//!   [`Context`]; a returned [`HandlerError`] is reported to the caller.
//! - **micro** ([`MicroHandler`]): maps a [`MicroRequest`] to a [`MicroReply`].
//!   Content-rewriting middleware such as [`CompressionMiddleware`] uses this
//!   flavor.
//!
//! ## Errors
//!
//! A failed context or micro handler is reported with a code, a description
//! and a JSON body `{"description":"...","code":"..."}`. Errors that carry no
//! code are reported as `"500"`.
//!
//! ## Getting started
//!
//! ```ignore
//! use micromw::prelude::*;
//!
//! let substrate = MemoryService::new(ServiceConfig::new("echo", "1.0.0"));
//! let service = Service::new(substrate.clone())
//!     .with_micro_middleware(CompressionMiddleware::new());
//!
//! service.add_micro_endpoint(
//!     "echo",
//!     micro_handler_fn(|req: MicroRequest| async move { Ok(MicroReply::new(req.data)) }),
//!     EndpointOptions::new(),
//! )?;
//! ```

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod request;
pub mod service;
pub mod transport;

pub use chain::{FnMiddleware, Middleware, MiddlewareChain, from_fn};
pub use config::{EndpointOptions, ServiceConfig};
pub use context::Context;
pub use error::report_error;
pub use handler::{
    BoxFuture, ContextHandler, Handler, MicroHandler, context_handler_fn, handler_fn,
    micro_handler_fn,
};
pub use message::{MicroReply, MicroRequest};
pub use middleware::{
    CompressionMiddleware, MetricsMiddleware, RequestId, RequestIdMiddleware, TracingMiddleware,
};
pub use request::Request;
pub use service::{Group, Service};
pub use transport::memory::{MemoryDelivery, MemoryService, ReplyMessage};
pub use transport::{
    Delivery, EndpointInfo, EndpointSpec, EndpointStats, Message, SERVICE_ERROR_CODE_HEADER,
    SERVICE_ERROR_HEADER, ServiceInfo, ServiceStats, Substrate, TransportError,
};

// Re-export the core crate
pub use micromw_core;
pub use micromw_core::{
    CompressionEncoding, CompressionError, CompressionLevel, DEFAULT_COMPRESS_MIN,
    HandlerError, Headers, StructuredError, compress_min, set_compress_min,
};

pub mod prelude {
    //! The most common types.
    pub use crate::{
        CompressionMiddleware, Context, ContextHandler, EndpointOptions, Group, Handler,
        HandlerError, Headers, MemoryService, Message, MicroHandler, MicroReply, MicroRequest,
        Middleware, MiddlewareChain, Request, RequestId, RequestIdMiddleware, Service,
        ServiceConfig, Substrate, context_handler_fn, from_fn, handler_fn, micro_handler_fn,
    };
}
