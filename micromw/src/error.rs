//! Reporting handler failures to the caller.
//!
//! [`report_error`] resolves a [`HandlerError`] into its structured form
//! and sends it through the delivery's error path on three channels: the
//! code, the description, and the JSON body carrying both.

use micromw_core::{Headers, HandlerError};

use crate::transport::{Delivery, TransportError};

/// Report `err` on `message`.
///
/// A failure to send is logged and returned; it is never retried.
pub fn report_error(message: &dyn Delivery, err: HandlerError) -> Result<(), TransportError> {
    let structured = err.into_structured();
    tracing::debug!(
        subject = %message.subject(),
        code = %structured.code,
        description = %structured.description,
        "handler error normalized"
    );

    // Two string fields always serialize.
    let body = structured.to_json().unwrap_or_default();

    message
        .error(
            &structured.code,
            &structured.description,
            body,
            Headers::new(),
        )
        .inspect_err(|err| {
            tracing::warn!(
                subject = %message.subject(),
                code = %structured.code,
                error = %err,
                "failed to send error reply"
            );
        })
}

/// Log a reply the transport refused.
pub(crate) fn log_send_failure(subject: &str, result: Result<(), TransportError>) {
    if let Err(err) = result {
        tracing::warn!(subject = %subject, error = %err, "failed to send reply");
    }
}

impl From<TransportError> for HandlerError {
    fn from(err: TransportError) -> Self {
        HandlerError::opaque(err)
    }
}
