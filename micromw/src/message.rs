//! Owned envelope types for the micro handler flavor.

mod reply;
mod request;

pub use reply::MicroReply;
pub use request::MicroRequest;
