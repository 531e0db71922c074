//! Request id propagation.
//!
//! [`RequestIdMiddleware`] looks for an id in the request headers, generates
//! one if none is found, and attaches it to the context as a [`RequestId`].
//! Handlers read it back with [`RequestId::from_context`].

use std::sync::Arc;

use micromw_core::HandlerError;

use crate::chain::Middleware;
use crate::context::Context;
use crate::handler::{BoxFuture, ContextHandler, MicroHandler};
use crate::message::{MicroReply, MicroRequest};
use crate::request::Request;

/// Header names tried when no tags are configured.
///
/// Header keys are case-sensitive, so the common spellings are all tried.
pub const DEFAULT_REQUEST_ID_TAGS: [&str; 4] = ["request_id", "Request_id", "Request_Id", "REQUEST_ID"];

/// The id attached to a request's context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the request id attached to `ctx`, if any.
    pub fn from_context(ctx: &Context) -> Option<&str> {
        ctx.value::<RequestId>().map(RequestId::as_str)
    }

    // First non-empty header among `tags`, or a fresh UUID v4.
    fn resolve(tags: &[String], headers: &micromw_core::Headers) -> Self {
        tags.iter()
            .map(|tag| headers.get(tag))
            .find(|value| !value.is_empty())
            .map(RequestId::new)
            .unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attaches a [`RequestId`] to every request.
///
/// Works on both the context and the micro chain.
#[derive(Debug, Clone)]
pub struct RequestIdMiddleware {
    tags: Arc<[String]>,
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::with_tags(DEFAULT_REQUEST_ID_TAGS)
    }
}

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for the id in `tags`, in order.
    ///
    /// An empty list falls back to [`DEFAULT_REQUEST_ID_TAGS`].
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return Self::default();
        }
        Self { tags: tags.into() }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Middleware<ContextHandler> for RequestIdMiddleware {
    fn wrap(&self, next: ContextHandler) -> ContextHandler {
        let tags = self.tags.clone();
        Arc::new(
            move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                let id = RequestId::resolve(&tags, req.headers());
                let ctx = req.context().with_value(id);
                next(req.with_context(ctx))
            },
        )
    }
}

impl Middleware<MicroHandler> for RequestIdMiddleware {
    fn wrap(&self, next: MicroHandler) -> MicroHandler {
        let tags = self.tags.clone();
        Arc::new(
            move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
                let id = RequestId::resolve(&tags, &req.headers);
                let ctx = req.context().with_value(id);
                next(req.with_context(ctx))
            },
        )
    }
}
