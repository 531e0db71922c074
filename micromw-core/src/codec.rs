//! Payload compression codecs.
//!
//! This module provides the [`Codec`] trait for whole-payload compression
//! and the two built-in implementations:
//! - [`GzipCodec`]: gzip (RFC 1952)
//! - [`DeflateCodec`]: raw DEFLATE (RFC 1951)

use bytes::Bytes;
use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};

/// Codec trait for payload compression.
///
/// # Example
///
/// ```ignore
/// use micromw_core::Codec;
/// use bytes::Bytes;
/// use std::io;
///
/// struct Lz4Codec;
///
/// impl Codec for Lz4Codec {
///     fn name(&self) -> &'static str { "lz4" }
///
///     fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 compression
///     }
///
///     fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
///         // ... lz4 decompression
///     }
/// }
/// ```
pub trait Codec: Send + Sync + 'static {
    /// The encoding name used in the `encoding` header (e.g., "gzip").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data, failing with [`io::ErrorKind::FileTooLarge`] once the
    /// output exceeds `limit` bytes.
    ///
    /// The default decodes everything before checking; streaming codecs
    /// should stop reading at the limit instead.
    fn decompress_limited(&self, data: &[u8], limit: usize) -> io::Result<Bytes> {
        let decompressed = self.decompress(data)?;
        if decompressed.len() > limit {
            return Err(size_exceeded(limit));
        }
        Ok(decompressed)
    }
}

fn size_exceeded(limit: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::FileTooLarge,
        format!("decoded payload exceeds {limit} bytes"),
    )
}

// Read at most `limit` bytes, plus one to detect overflow.
fn read_limited<R: Read>(reader: R, limit: usize) -> io::Result<Bytes> {
    let mut decompressed = Vec::new();
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut decompressed)?;
    if decompressed.len() > limit {
        return Err(size_exceeded(limit));
    }
    Ok(Bytes::from(decompressed))
}

/// A boxed codec for type-erased storage.
///
/// Use `Option<BoxedCodec>` where `None` represents identity (no compression).
#[derive(Clone)]
pub struct BoxedCodec(Arc<dyn Codec>);

impl BoxedCodec {
    /// Create a new boxed codec.
    pub fn new<C: Codec>(codec: C) -> Self {
        BoxedCodec(Arc::new(codec))
    }

    /// Get the codec name.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }

    /// Decompress at most `limit` bytes of output.
    pub fn decompress_limited(&self, data: &[u8], limit: usize) -> io::Result<Bytes> {
        self.0.decompress_limited(data, limit)
    }
}

impl std::fmt::Debug for BoxedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoxedCodec").field(&self.name()).finish()
    }
}

/// Gzip codec using flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    /// Create a new GzipCodec with the specified compression level.
    ///
    /// Level ranges from 0 (no compression) to 9 (best compression).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }

    fn decompress_limited(&self, data: &[u8], limit: usize) -> io::Result<Bytes> {
        read_limited(GzDecoder::new(data), limit)
    }
}

/// Deflate codec using flate2.
///
/// Note: this is the raw DEFLATE format (RFC 1951) with no zlib wrapper,
/// the format produced by standard deflate stream writers.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    /// Compression level (0-9). Default is 6.
    pub level: u32,
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl DeflateCodec {
    /// Create a new DeflateCodec with the specified compression level.
    ///
    /// Level ranges from 0 (no compression) to 9 (best compression).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Codec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut decoder = DeflateDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(Bytes::from(decompressed))
    }

    fn decompress_limited(&self, data: &[u8], limit: usize) -> io::Result<Bytes> {
        read_limited(DeflateDecoder::new(data), limit)
    }
}

/// Compress bytes using the specified codec.
///
/// If `codec` is `None`, returns the input unchanged (identity).
pub fn compress_bytes(bytes: Bytes, codec: Option<&BoxedCodec>) -> io::Result<Bytes> {
    match codec {
        None => Ok(bytes),
        Some(c) => c.compress(&bytes),
    }
}

/// Decompress bytes using the specified codec.
///
/// If `codec` is `None`, returns the input unchanged (identity).
pub fn decompress_bytes(bytes: Bytes, codec: Option<&BoxedCodec>) -> io::Result<Bytes> {
    match codec {
        None => Ok(bytes),
        Some(c) => c.decompress(&bytes),
    }
}
