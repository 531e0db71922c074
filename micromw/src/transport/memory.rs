//! In-process substrate.
//!
//! [`MemoryService`] routes requests by exact subject to registered
//! endpoints and runs every delivery on its own tokio task. It is what the
//! demo binaries and the end-to-end tests run against.
//!
//! ```ignore
//! let service = MemoryService::new(ServiceConfig::new("echo", "1.0.0"));
//! service.add_endpoint(spec, handler)?;
//!
//! let reply = service
//!     .request("echo", Headers::new(), Bytes::from("hi"), Duration::from_secs(1))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use micromw_core::Headers;
use tokio::sync::oneshot;

use super::{
    Delivery, EndpointInfo, EndpointSpec, EndpointStats, Message, SERVICE_ERROR_CODE_HEADER,
    SERVICE_ERROR_HEADER, ServiceInfo, ServiceStats, Substrate, TransportError,
};
use crate::config::ServiceConfig;
use crate::handler::Handler;

/// A reply as seen by the requesting side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyMessage {
    pub headers: Headers,
    pub data: Bytes,
}

impl ReplyMessage {
    /// Error code, if this is an error reply.
    pub fn error_code(&self) -> Option<&str> {
        non_empty(self.headers.get(SERVICE_ERROR_CODE_HEADER))
    }

    /// Error description, if this is an error reply.
    pub fn error_description(&self) -> Option<&str> {
        non_empty(self.headers.get(SERVICE_ERROR_HEADER))
    }

    /// Returns true if the handler reported an error.
    pub fn is_error(&self) -> bool {
        self.error_code().is_some()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

/// An in-process micro-service.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    config: ServiceConfig,
    endpoints: RwLock<HashMap<String, Endpoint>>,
    stopped: AtomicBool,
}

struct Endpoint {
    spec: EndpointSpec,
    handler: Handler,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Counters {
    fn record_error(&self, description: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(description.to_string());
    }

    fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl MemoryService {
    /// Create a service with a fresh instance id.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().simple().to_string(),
                config,
                endpoints: RwLock::new(HashMap::new()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Instance id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Send a request and wait up to `timeout` for the reply.
    ///
    /// Error replies are returned as `Ok`; inspect
    /// [`ReplyMessage::error_code`] to tell them apart.
    pub async fn request(
        &self,
        subject: &str,
        headers: Headers,
        data: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<ReplyMessage, TransportError> {
        if self.stopped() {
            return Err(TransportError::Stopped);
        }

        let (handler, counters) = {
            let endpoints = self
                .inner
                .endpoints
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let endpoint = endpoints
                .get(subject)
                .ok_or_else(|| TransportError::NoResponders(subject.to_string()))?;
            (endpoint.handler.clone(), endpoint.counters.clone())
        };

        counters.requests.fetch_add(1, Ordering::Relaxed);

        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let (delivery, rx) = MemoryDelivery::new(subject, Some(inbox), headers, data.into());
        let delivery = delivery.with_counters(counters);
        let msg: Message = Arc::new(delivery);

        tokio::spawn(handler(msg));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::NoReply),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Substrate for MemoryService {
    fn add_endpoint(&self, spec: EndpointSpec, handler: Handler) -> Result<(), TransportError> {
        if self.stopped() {
            return Err(TransportError::Stopped);
        }
        validate_subject(&spec.subject)?;

        let mut endpoints = self
            .inner
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if endpoints.contains_key(&spec.subject) {
            return Err(TransportError::DuplicateEndpoint(spec.subject));
        }

        tracing::debug!(name = %spec.name, subject = %spec.subject, "endpoint registered");
        endpoints.insert(
            spec.subject.clone(),
            Endpoint {
                spec,
                handler,
                counters: Arc::default(),
            },
        );
        Ok(())
    }

    fn info(&self) -> ServiceInfo {
        let endpoints = self
            .inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<EndpointInfo> = endpoints
            .values()
            .map(|endpoint| EndpointInfo {
                name: endpoint.spec.name.clone(),
                subject: endpoint.spec.subject.clone(),
                queue_group: endpoint.spec.queue_group.clone(),
                metadata: endpoint.spec.metadata.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.subject.cmp(&b.subject));

        ServiceInfo {
            id: self.inner.id.clone(),
            config: self.inner.config.clone(),
            endpoints: infos,
        }
    }

    fn stats(&self) -> ServiceStats {
        let endpoints = self
            .inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stats: Vec<EndpointStats> = endpoints
            .values()
            .map(|endpoint| EndpointStats {
                name: endpoint.spec.name.clone(),
                subject: endpoint.spec.subject.clone(),
                num_requests: endpoint.counters.requests.load(Ordering::Relaxed),
                num_errors: endpoint.counters.errors.load(Ordering::Relaxed),
                last_error: endpoint
                    .counters
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            })
            .collect();
        stats.sort_by(|a, b| a.subject.cmp(&b.subject));

        ServiceStats {
            id: self.inner.id.clone(),
            name: self.inner.config.name.clone(),
            version: self.inner.config.version.clone(),
            endpoints: stats,
        }
    }

    fn reset(&self) {
        let endpoints = self
            .inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for endpoint in endpoints.values() {
            endpoint.counters.reset();
        }
    }

    fn stop(&self) -> Result<(), TransportError> {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!(service = %self.inner.config.name, "service stopped");
        }
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("stopped", &self.stopped())
            .finish()
    }
}

// Subjects are dot-separated tokens; empty tokens and whitespace are invalid.
fn validate_subject(subject: &str) -> Result<(), TransportError> {
    let valid = !subject.is_empty()
        && !subject.contains(char::is_whitespace)
        && subject.split('.').all(|token| !token.is_empty());
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidSubject(subject.to_string()))
    }
}

/// A delivery whose reply goes to a oneshot channel.
pub struct MemoryDelivery {
    subject: String,
    reply: Option<String>,
    headers: Headers,
    data: Bytes,
    reply_tx: Mutex<Option<oneshot::Sender<ReplyMessage>>>,
    counters: Option<Arc<Counters>>,
}

impl MemoryDelivery {
    /// Create a delivery and the receiver its reply will arrive on.
    ///
    /// The receiver errors if the delivery is dropped without a reply.
    pub fn new(
        subject: impl Into<String>,
        reply: Option<String>,
        headers: Headers,
        data: Bytes,
    ) -> (Self, oneshot::Receiver<ReplyMessage>) {
        let (tx, rx) = oneshot::channel();
        let delivery = Self {
            subject: subject.into(),
            reply,
            headers,
            data,
            reply_tx: Mutex::new(Some(tx)),
            counters: None,
        };
        (delivery, rx)
    }

    fn with_counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = Some(counters);
        self
    }

    fn take_reply_tx(&self) -> Result<oneshot::Sender<ReplyMessage>, TransportError> {
        self.reply_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyReplied)
    }
}

fn send(tx: oneshot::Sender<ReplyMessage>, reply: ReplyMessage) -> Result<(), TransportError> {
    // An error here means the requester gave up waiting.
    tx.send(reply).map_err(|_| TransportError::Timeout)
}

impl Delivery for MemoryDelivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn data(&self) -> &Bytes {
        &self.data
    }

    fn respond(&self, data: Bytes, headers: Headers) -> Result<(), TransportError> {
        send(self.take_reply_tx()?, ReplyMessage { headers, data })
    }

    fn error(
        &self,
        code: &str,
        description: &str,
        data: Bytes,
        mut headers: Headers,
    ) -> Result<(), TransportError> {
        let tx = self.take_reply_tx()?;
        if let Some(counters) = &self.counters {
            counters.record_error(description);
        }
        headers.set(SERVICE_ERROR_HEADER, description);
        headers.set(SERVICE_ERROR_CODE_HEADER, code);
        send(tx, ReplyMessage { headers, data })
    }
}

/// A standalone message for driving handlers directly in tests.
#[cfg(test)]
pub(crate) fn test_message(
    subject: &str,
    data: Bytes,
) -> (Message, oneshot::Receiver<ReplyMessage>) {
    test_message_with_headers(subject, Headers::new(), data)
}

#[cfg(test)]
pub(crate) fn test_message_with_headers(
    subject: &str,
    headers: Headers,
    data: Bytes,
) -> (Message, oneshot::Receiver<ReplyMessage>) {
    let (delivery, rx) = MemoryDelivery::new(subject, Some("_INBOX.test".into()), headers, data);
    (Arc::new(delivery), rx)
}
