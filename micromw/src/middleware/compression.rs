//! Payload compression for micro endpoints.
//!
//! Each direction is negotiated on its own header:
//!
//! | Direction | Header            | Meaning                                  |
//! |-----------|-------------------|------------------------------------------|
//! | inbound   | `encoding`        | how the request payload IS encoded        |
//! | outbound  | `accept-encoding` | how the caller wants the reply encoded    |
//! | outbound  | `encoding`        | how the reply payload IS encoded (if set) |
//!
//! Replies shorter than [`compress_min`] are never compressed. Header values
//! are matched exactly: only `gzip` and `deflate` are understood.

use std::io;
use std::sync::Arc;

use micromw_core::{
    CompressionEncoding, CompressionError, CompressionLevel, HEADER_ACCEPT_ENCODING,
    HEADER_ENCODING, HandlerError, compress_bytes, compress_min, decompress_bytes,
    negotiate_response_encoding,
};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, MicroHandler};
use crate::message::{MicroReply, MicroRequest};

/// Decompresses requests and compresses replies.
///
/// # Example
///
/// ```ignore
/// let service = Service::new(substrate)
///     .with_micro_middleware(CompressionMiddleware::with_level(CompressionLevel::Best));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionMiddleware {
    level: CompressionLevel,
    max_decoded_size: Option<usize>,
}

impl CompressionMiddleware {
    /// Compress replies at the default level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress replies at `level`.
    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Reject requests whose decoded payload is larger than `max` bytes.
    ///
    /// Decoding stops at the limit, so an oversized payload is never held in
    /// memory. Unlimited by default.
    pub fn with_max_decoded_size(mut self, max: usize) -> Self {
        self.max_decoded_size = Some(max);
        self
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn max_decoded_size(&self) -> Option<usize> {
        self.max_decoded_size
    }
}

impl Middleware<MicroHandler> for CompressionMiddleware {
    fn wrap(&self, next: MicroHandler) -> MicroHandler {
        let level = self.level;
        let max_decoded_size = self.max_decoded_size;
        Arc::new(
            move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
                let next = next.clone();
                Box::pin(async move {
                    let req = decompress_request(req, max_decoded_size)?;

                    // Read before `next` takes the request.
                    let accept = req.headers.get(HEADER_ACCEPT_ENCODING).to_string();
                    let subject = req.subject.clone();

                    let reply = next(req).await?;
                    compress_reply(&subject, &accept, level, reply).map_err(HandlerError::from)
                })
            },
        )
    }
}

/// Decode the request payload per its `encoding` header.
///
/// On success the header is removed, since the payload is no longer encoded.
fn decompress_request(
    mut req: MicroRequest,
    max_decoded_size: Option<usize>,
) -> Result<MicroRequest, CompressionError> {
    let encoding = CompressionEncoding::from_header(req.headers.get(HEADER_ENCODING))?;
    let Some(codec) = encoding.codec() else {
        return Ok(req);
    };

    let decoded = match max_decoded_size {
        Some(limit) => codec.decompress_limited(&req.data, limit),
        None => decompress_bytes(std::mem::take(&mut req.data), Some(&codec)),
    };
    req.data = decoded.map_err(|e| match max_decoded_size {
        Some(limit) if e.kind() == io::ErrorKind::FileTooLarge => CompressionError::TooLarge(limit),
        _ => CompressionError::Decompression(format!("{}: {e}", encoding.as_str())),
    })?;
    req.headers.delete(HEADER_ENCODING);
    Ok(req)
}

/// Encode the reply per the caller's `accept-encoding`, if it is large
/// enough.
fn compress_reply(
    subject: &str,
    accept: &str,
    level: CompressionLevel,
    mut reply: MicroReply,
) -> Result<MicroReply, CompressionError> {
    let encoding = negotiate_response_encoding(accept);
    if encoding.is_identity() {
        if !accept.is_empty() {
            tracing::debug!(subject, accept, "requested reply encoding not supported");
        }
        return Ok(reply);
    }

    let min = compress_min();
    if reply.data.len() < min {
        tracing::debug!(
            subject,
            size = reply.data.len(),
            min,
            "reply below compression threshold"
        );
        return Ok(reply);
    }

    let codec = encoding.codec_with_level(level);
    reply.data = compress_bytes(std::mem::take(&mut reply.data), codec.as_ref())
        .map_err(|e| CompressionError::Compression(format!("{}: {e}", encoding.as_str())))?;
    reply.headers.set(HEADER_ENCODING, encoding.as_str());
    Ok(reply)
}
