//! Core protocol types for micromw.
//!
//! This crate provides the transport-independent pieces shared by the
//! `micromw` middleware runtime and anything that talks to it:
//!
//! ## Modules
//!
//! - [`headers`]: Multi-valued, case-sensitive message headers
//! - [`error`]: Structured handler errors and their wire encoding
//! - [`codec`]: Compression codec trait and implementations
//! - [`compression`]: Encoding negotiation and the compression threshold

mod codec;
mod compression;
mod error;
mod headers;

pub use codec::*;
pub use compression::*;
pub use error::*;
pub use headers::*;
