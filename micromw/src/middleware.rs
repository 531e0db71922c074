//! Built-in middleware.
//!
//! | Middleware               | Flavors        |
//! |--------------------------|----------------|
//! | [`CompressionMiddleware`] | micro          |
//! | [`RequestIdMiddleware`]   | context, micro |
//! | [`MetricsMiddleware`]     | plain          |
//! | [`TracingMiddleware`]     | context, micro |

mod compression;
mod metrics;
mod request_id;
mod trace;

pub use compression::CompressionMiddleware;
pub use metrics::{
    MESSAGES_TOTAL, MetricsMiddleware, PAYLOAD_SIZE_BYTES, REQUEST_DURATION_SECONDS,
};
pub use request_id::{DEFAULT_REQUEST_ID_TAGS, RequestId, RequestIdMiddleware};
pub use trace::TracingMiddleware;
