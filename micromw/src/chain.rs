//! Middleware composition.
//!
//! A [`Middleware`] turns a handler into another handler of the same
//! flavor. A [`MiddlewareChain`] holds middleware in registration order and
//! composes them around a terminal handler so that the first registered
//! middleware is the outermost:
//!
//! ```text
//! chain [A, B] around H
//!
//!   A pre ─▶ B pre ─▶ H ─▶ B post ─▶ A post
//! ```
//!
//! The same algorithm serves all three handler flavors: `MiddlewareChain<H>`
//! is generic over the handler type.
//!
//! # Example
//!
//! ```ignore
//! use micromw::{MiddlewareChain, from_fn, ContextHandler};
//!
//! let chain = MiddlewareChain::<ContextHandler>::new()
//!     .with(RequestIdMiddleware::default())
//!     .with(from_fn(|next: ContextHandler| next));
//!
//! let composed = chain.wrap(handler);
//! ```

use std::sync::Arc;

/// Middleware over handlers of type `H`.
///
/// Implementations should only hold configuration. Any per-invocation state
/// belongs in the request or its context, never in `self`.
pub trait Middleware<H>: Send + Sync {
    /// Wrap `next` and return the wrapped handler.
    fn wrap(&self, next: H) -> H;
}

/// An ordered, immutable list of middleware.
///
/// Adding middleware returns a new chain; the receiver is never changed, so
/// a chain captured by a group or endpoint is unaffected by later additions
/// made elsewhere.
pub struct MiddlewareChain<H> {
    layers: Vec<Arc<dyn Middleware<H>>>,
}

impl<H> MiddlewareChain<H> {
    /// Create a new empty middleware chain.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Return a new chain with `middleware` appended as the innermost layer.
    pub fn with<M>(&self, middleware: M) -> Self
    where
        M: Middleware<H> + 'static,
    {
        self.with_arc(Arc::new(middleware))
    }

    /// Return a new chain with a shared middleware appended.
    pub fn with_arc(&self, middleware: Arc<dyn Middleware<H>>) -> Self {
        let mut layers = Vec::with_capacity(self.layers.len() + 1);
        layers.extend(self.layers.iter().cloned());
        layers.push(middleware);
        Self { layers }
    }

    /// Return a new chain with all of `other`'s middleware appended.
    pub fn extend(&self, other: &MiddlewareChain<H>) -> Self {
        let mut layers = self.layers.clone();
        layers.extend(other.layers.iter().cloned());
        Self { layers }
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Get the number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Wrap a terminal handler with all middleware in the chain.
    ///
    /// Middleware are applied in reverse order so that the first middleware
    /// added is the first to see the request and the last to see the result.
    /// An empty chain returns `handler` unchanged.
    pub fn wrap(&self, handler: H) -> H {
        let mut wrapped = handler;
        for middleware in self.layers.iter().rev() {
            wrapped = middleware.wrap(wrapped);
        }
        wrapped
    }
}

impl<H> Clone for MiddlewareChain<H> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
        }
    }
}

impl<H> Default for MiddlewareChain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for MiddlewareChain<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("count", &self.layers.len())
            .finish()
    }
}

/// A function-based middleware.
///
/// Created with [`from_fn`].
pub struct FnMiddleware<F> {
    func: F,
}

/// Create a middleware from a closure that wraps a handler.
///
/// # Example
///
/// ```ignore
/// use micromw::{from_fn, MicroHandler, MicroRequest};
/// use std::sync::Arc;
///
/// let prefix = from_fn(|next: MicroHandler| -> MicroHandler {
///     Arc::new(move |req: MicroRequest| {
///         let next = next.clone();
///         Box::pin(async move {
///             let mut reply = next(req).await?;
///             reply.data = [b"Hello from middleware: ".as_slice(), &reply.data].concat().into();
///             Ok(reply)
///         })
///     })
/// });
/// ```
pub fn from_fn<F>(func: F) -> FnMiddleware<F> {
    FnMiddleware { func }
}

impl<H, F> Middleware<H> for FnMiddleware<F>
where
    F: Fn(H) -> H + Send + Sync,
{
    fn wrap(&self, next: H) -> H {
        (self.func)(next)
    }
}

impl<F> Clone for FnMiddleware<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
        }
    }
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware").finish()
    }
}
