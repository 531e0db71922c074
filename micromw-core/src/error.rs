//! Handler error types and their wire encoding.
//!
//! This module provides the error types that flow out of a handler chain:
//! - [`StructuredError`]: The `(description, code)` pair sent to callers
//! - [`HandlerError`]: Either a structured error or an opaque failure
//! - [`CompressionError`]: Payload encoding and decoding failures

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Code used when a failure carries no code of its own.
pub const DEFAULT_ERROR_CODE: &str = "500";

/// A handler failure as seen by the remote caller.
///
/// # Wire Format
///
/// Serialized as a compact JSON object, `description` first:
/// ```json
/// {"description":"request failed","code":"500"}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredError {
    /// Human-readable description.
    pub description: String,
    /// Machine-readable error code.
    pub code: String,
}

impl StructuredError {
    /// Create a new structured error.
    pub fn new<C, D>(code: C, description: D) -> Self
    where
        C: Into<String>,
        D: Into<String>,
    {
        Self {
            description: description.into(),
            code: code.into(),
        }
    }

    /// Serialize to the wire body.
    pub fn to_json(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Decode a wire body produced by [`StructuredError::to_json`].
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl std::error::Error for StructuredError {}

/// Error returned from a context or micro handler.
///
/// A handler either fails with a code it chose ([`HandlerError::Structured`])
/// or with any other error ([`HandlerError::Opaque`]), which is reported with
/// [`DEFAULT_ERROR_CODE`] and its rendered message.
///
/// # Example
///
/// ```
/// use micromw_core::HandlerError;
///
/// let err = HandlerError::not_found("no such user");
/// let structured = err.into_structured();
/// assert_eq!(structured.code, "404");
/// assert_eq!(structured.description, "no such user");
///
/// let err = HandlerError::from("request failed");
/// let structured = err.into_structured();
/// assert_eq!(structured.code, "500");
/// assert_eq!(structured.description, "request failed");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A failure that already carries a code.
    #[error("{0}")]
    Structured(StructuredError),

    /// Any other failure.
    #[error("{0}")]
    Opaque(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl HandlerError {
    /// Create a structured error with a code and description.
    pub fn new<C, D>(code: C, description: D) -> Self
    where
        C: Into<String>,
        D: Into<String>,
    {
        HandlerError::Structured(StructuredError::new(code, description))
    }

    /// Wrap any error as an opaque failure.
    pub fn opaque<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        HandlerError::Opaque(err.into())
    }

    /// Get the code that will be reported for this error.
    pub fn code(&self) -> &str {
        match self {
            HandlerError::Structured(err) => &err.code,
            HandlerError::Opaque(_) => DEFAULT_ERROR_CODE,
        }
    }

    /// Resolve into the `(description, code)` pair reported to the caller.
    pub fn into_structured(self) -> StructuredError {
        match self {
            HandlerError::Structured(err) => err,
            HandlerError::Opaque(err) => StructuredError::new(DEFAULT_ERROR_CODE, err.to_string()),
        }
    }

    // Convenience constructors

    /// Create a bad request (`400`) error.
    pub fn bad_request<S: Into<String>>(description: S) -> Self {
        Self::new("400", description)
    }

    /// Create an unauthorized (`401`) error.
    pub fn unauthorized<S: Into<String>>(description: S) -> Self {
        Self::new("401", description)
    }

    /// Create a forbidden (`403`) error.
    pub fn forbidden<S: Into<String>>(description: S) -> Self {
        Self::new("403", description)
    }

    /// Create a not found (`404`) error.
    pub fn not_found<S: Into<String>>(description: S) -> Self {
        Self::new("404", description)
    }

    /// Create an internal (`500`) error.
    pub fn internal<S: Into<String>>(description: S) -> Self {
        Self::new(DEFAULT_ERROR_CODE, description)
    }

    /// Create an unavailable (`503`) error.
    pub fn unavailable<S: Into<String>>(description: S) -> Self {
        Self::new("503", description)
    }
}

impl From<StructuredError> for HandlerError {
    fn from(err: StructuredError) -> Self {
        HandlerError::Structured(err)
    }
}

impl From<CompressionError> for HandlerError {
    fn from(err: CompressionError) -> Self {
        HandlerError::Opaque(Box::new(err))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::Opaque(Box::new(err))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Opaque(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::Opaque(message.into())
    }
}

/// Payload encoding errors.
///
/// Returned by the compression middleware. Any of these aborts the
/// invocation before the next handler runs (inbound) or before the reply is
/// sent (outbound).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// The declared encoding is not one of `""`, `gzip`, `deflate`.
    #[error("unsupported encoding: {0}")]
    Unsupported(String),

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// The decoded payload is larger than the configured maximum.
    #[error("decoded payload exceeds maximum allowed size of {0} bytes")]
    TooLarge(usize),
}
