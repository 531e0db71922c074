//! Per-request tracing spans.

use std::sync::Arc;

use micromw_core::HandlerError;
use tracing::Instrument;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, ContextHandler, MicroHandler};
use crate::message::{MicroReply, MicroRequest};
use crate::middleware::RequestId;
use crate::request::Request;

/// Runs each invocation inside a `micro.request` span.
///
/// The span carries the subject and, when an earlier middleware attached
/// one, the request id. Handler failures are logged at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

fn request_span(subject: &str, request_id: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "micro.request",
        subject = %subject,
        request_id = request_id.unwrap_or_default(),
    )
}

fn log_failure(err: &HandlerError) {
    tracing::debug!(code = %err.code(), error = %err, "handler failed");
}

impl Middleware<ContextHandler> for TracingMiddleware {
    fn wrap(&self, next: ContextHandler) -> ContextHandler {
        Arc::new(
            move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                let span = request_span(req.subject(), RequestId::from_context(req.context()));
                let fut = next(req);
                Box::pin(
                    async move {
                        let result = fut.await;
                        if let Err(err) = &result {
                            log_failure(err);
                        }
                        result
                    }
                    .instrument(span),
                )
            },
        )
    }
}

impl Middleware<MicroHandler> for TracingMiddleware {
    fn wrap(&self, next: MicroHandler) -> MicroHandler {
        Arc::new(
            move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
                let span = request_span(&req.subject, RequestId::from_context(req.context()));
                let fut = next(req);
                Box::pin(
                    async move {
                        let result = fut.await;
                        if let Err(err) = &result {
                            log_failure(err);
                        }
                        result
                    }
                    .instrument(span),
                )
            },
        )
    }
}
