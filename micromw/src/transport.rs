//! The messaging substrate contract.
//!
//! The interception layer does not own connections or routing. It consumes
//! two traits:
//! - [`Delivery`]: one inbound message with its reply path
//! - [`Substrate`]: the runtime that owns endpoints and dispatches deliveries
//!
//! [`memory::MemoryService`] and [`memory::MemoryDelivery`] implement them
//! in-process.

pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use micromw_core::Headers;

use crate::config::ServiceConfig;
use crate::handler::Handler;

/// Header carrying the error description on an error reply.
pub const SERVICE_ERROR_HEADER: &str = "Nats-Service-Error";

/// Header carrying the error code on an error reply.
pub const SERVICE_ERROR_CODE_HEADER: &str = "Nats-Service-Error-Code";

/// Errors raised by a substrate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no responders on subject `{0}`")]
    NoResponders(String),

    #[error("request timed out")]
    Timeout,

    #[error("handler finished without replying")]
    NoReply,

    #[error("message already replied to")]
    AlreadyReplied,

    #[error("service stopped")]
    Stopped,

    #[error("an endpoint is already registered on subject `{0}`")]
    DuplicateEndpoint(String),

    #[error("invalid subject `{0}`")]
    InvalidSubject(String),
}

/// One inbound message together with its reply path.
///
/// A delivery may be answered once, with either [`Delivery::respond`] or
/// [`Delivery::error`].
pub trait Delivery: Send + Sync {
    /// Subject the message was published on.
    fn subject(&self) -> &str;

    /// Reply address, if the sender expects an answer.
    fn reply(&self) -> Option<&str>;

    /// Message headers.
    fn headers(&self) -> &Headers;

    /// Message payload.
    fn data(&self) -> &Bytes;

    /// Send a successful reply.
    fn respond(&self, data: Bytes, headers: Headers) -> Result<(), TransportError>;

    /// Send an error reply.
    ///
    /// `code` and `description` travel in [`SERVICE_ERROR_CODE_HEADER`] and
    /// [`SERVICE_ERROR_HEADER`]; `data` is the payload.
    fn error(
        &self,
        code: &str,
        description: &str,
        data: Bytes,
        headers: Headers,
    ) -> Result<(), TransportError>;
}

/// A shared handle to an inbound message.
pub type Message = Arc<dyn Delivery>;

/// What the substrate needs to register one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Endpoint name, reported in info and stats.
    pub name: String,
    /// Fully qualified subject, group prefix included.
    pub subject: String,
    /// Queue group, if any.
    pub queue_group: Option<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

/// Static description of a running service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: String,
    pub config: ServiceConfig,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInfo {
    pub name: String,
    pub subject: String,
    pub queue_group: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Runtime counters of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub id: String,
    pub name: String,
    pub version: String,
    pub endpoints: Vec<EndpointStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub name: String,
    pub subject: String,
    pub num_requests: u64,
    pub num_errors: u64,
    pub last_error: Option<String>,
}

/// A micro-service runtime that owns endpoints.
pub trait Substrate: Send + Sync {
    /// Register `handler` for deliveries on `spec.subject`.
    fn add_endpoint(&self, spec: EndpointSpec, handler: Handler) -> Result<(), TransportError>;

    /// Describe the service and its endpoints.
    fn info(&self) -> ServiceInfo;

    /// Current per-endpoint counters.
    fn stats(&self) -> ServiceStats;

    /// Zero every counter.
    fn reset(&self);

    /// Stop accepting deliveries.
    fn stop(&self) -> Result<(), TransportError>;

    /// Returns true once [`Substrate::stop`] has been called.
    fn stopped(&self) -> bool;
}

impl fmt::Debug for dyn Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject())
            .field("reply", &self.reply())
            .field("headers", self.headers())
            .field("len", &self.data().len())
            .finish()
    }
}
