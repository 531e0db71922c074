//! Compression configuration types.
//!
//! This module provides the negotiation side of payload compression:
//! - [`CompressionEncoding`]: Supported compression algorithms
//! - [`CompressionLevel`]: Compression quality settings
//! - [`compress_min`] / [`set_compress_min`]: Process-wide size threshold

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::codec::{BoxedCodec, DeflateCodec, GzipCodec};
use crate::error::CompressionError;

/// Request header declaring how the request payload is encoded, and reply
/// header declaring how the reply payload is encoded.
pub const HEADER_ENCODING: &str = "encoding";

/// Request header declaring how the caller wants the reply encoded.
pub const HEADER_ACCEPT_ENCODING: &str = "accept-encoding";

/// Default minimum reply size, in bytes, before compression is applied.
pub const DEFAULT_COMPRESS_MIN: usize = 1000;

static COMPRESS_MIN: AtomicUsize = AtomicUsize::new(DEFAULT_COMPRESS_MIN);

/// Set the process-wide minimum reply size for compression.
///
/// Takes effect for every invocation that starts after the call, including
/// endpoints registered earlier.
pub fn set_compress_min(min_bytes: usize) {
    COMPRESS_MIN.store(min_bytes, Ordering::Relaxed);
}

/// Get the process-wide minimum reply size for compression.
pub fn compress_min() -> usize {
    COMPRESS_MIN.load(Ordering::Relaxed)
}

/// Supported payload encodings.
///
/// This enum is used for header parsing and negotiation.
/// Use [`CompressionEncoding::codec()`] to get the actual codec implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl CompressionEncoding {
    /// Parse an `encoding` header value.
    ///
    /// An empty value means the payload is not encoded. Anything other than
    /// `gzip` or `deflate` is rejected.
    pub fn from_header(value: &str) -> Result<Self, CompressionError> {
        match value {
            "" => Ok(Self::Identity),
            "gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            other => Err(CompressionError::Unsupported(other.to_string())),
        }
    }

    /// Get the header value string for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    /// Returns true if this encoding is identity (no compression).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Get the codec for this encoding.
    ///
    /// Returns `None` for identity, `Some(BoxedCodec)` for others.
    pub fn codec(&self) -> Option<BoxedCodec> {
        self.codec_with_level(CompressionLevel::Default)
    }

    /// Get the codec for this encoding with the specified compression level.
    ///
    /// Returns `None` for identity, `Some(BoxedCodec)` for others.
    pub fn codec_with_level(&self, level: CompressionLevel) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some(BoxedCodec::new(GzipCodec::with_level(level_to_flate2(level)))),
            Self::Deflate => Some(BoxedCodec::new(DeflateCodec::with_level(level_to_flate2(level)))),
        }
    }
}

/// Compression level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Fastest compression (lowest ratio).
    Fastest,
    /// Best compression (highest ratio, slowest).
    Best,
    /// Default compression level.
    #[default]
    Default,
    /// Precise compression level, 0-9 (0=no compression, 9=best).
    Precise(u32),
}

impl CompressionLevel {
    /// Create a compression level with a precise value.
    pub fn precise(level: u32) -> Self {
        CompressionLevel::Precise(level)
    }
}

/// Convert CompressionLevel to a flate2 level (0-9).
///
/// - `Fastest` → 1
/// - `Best` → 9
/// - `Default` → 6
/// - `Precise(n)` → n clamped to 0-9
fn level_to_flate2(level: CompressionLevel) -> u32 {
    match level {
        CompressionLevel::Fastest => 1,
        CompressionLevel::Best => 9,
        CompressionLevel::Default => 6,
        CompressionLevel::Precise(n) => n.clamp(0, 9),
    }
}

/// Negotiate the reply encoding from an `accept-encoding` header value.
///
/// The value is matched exactly against `gzip` and `deflate`. Anything else,
/// including lists and parameters, negotiates to identity, which leaves the
/// reply untouched.
pub fn negotiate_response_encoding(accept: &str) -> CompressionEncoding {
    match accept {
        "gzip" => CompressionEncoding::Gzip,
        "deflate" => CompressionEncoding::Deflate,
        _ => CompressionEncoding::Identity,
    }
}
