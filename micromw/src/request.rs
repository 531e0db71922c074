//! The context handler envelope.

use bytes::Bytes;
use micromw_core::Headers;

use crate::context::Context;
use crate::transport::{Message, TransportError};

/// An inbound message paired with a request-scoped [`Context`].
///
/// Deriving a request with [`Request::with_context`] shares the underlying
/// message and never changes the receiver.
#[derive(Clone)]
pub struct Request {
    message: Message,
    ctx: Context,
}

impl Request {
    /// Pair a message with a context.
    pub fn new(message: Message, ctx: Context) -> Self {
        Self { message, ctx }
    }

    pub fn subject(&self) -> &str {
        self.message.subject()
    }

    pub fn reply(&self) -> Option<&str> {
        self.message.reply()
    }

    pub fn headers(&self) -> &Headers {
        self.message.headers()
    }

    pub fn data(&self) -> &Bytes {
        self.message.data()
    }

    /// Send a reply with no headers.
    pub fn respond(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        self.message.respond(data.into(), Headers::new())
    }

    /// Send a reply with headers.
    pub fn respond_with_headers(
        &self,
        data: impl Into<Bytes>,
        headers: Headers,
    ) -> Result<(), TransportError> {
        self.message.respond(data.into(), headers)
    }

    /// Report an error directly through the transport.
    ///
    /// Handlers normally return a [`HandlerError`](micromw_core::HandlerError)
    /// instead and let the endpoint report it.
    pub fn error(
        &self,
        code: &str,
        description: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), TransportError> {
        self.message
            .error(code, description, data.into(), Headers::new())
    }

    /// The request-scoped context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Return a new request carrying `ctx`.
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            message: self.message.clone(),
            ctx,
        }
    }

    /// The underlying transport message.
    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("message", &self.message)
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{test_message, test_message_with_headers};

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn test_accessors_delegate_to_message() {
        let mut headers = Headers::new();
        headers.add("a", "1");
        headers.add("a", "2");
        let (msg, _rx) = test_message_with_headers("svc.op", headers, Bytes::from("payload"));
        let req = Request::new(msg, Context::background());

        assert_eq!(req.subject(), "svc.op");
        assert_eq!(req.reply(), Some("_INBOX.test"));
        assert_eq!(req.headers().values("a"), ["1", "2"]);
        assert_eq!(req.data(), &Bytes::from("payload"));
        assert!(req.context().is_background());
    }

    #[test]
    fn test_with_context_leaves_original() {
        let (msg, _rx) = test_message("svc", Bytes::new());
        let original = Request::new(msg, Context::background());
        let derived = original.with_context(original.context().with_value(Tag("x")));

        assert_eq!(derived.context().value::<Tag>(), Some(&Tag("x")));
        assert_eq!(original.context().value::<Tag>(), None);
        assert!(std::sync::Arc::ptr_eq(original.message(), derived.message()));
    }

    #[tokio::test]
    async fn test_respond() {
        let (msg, rx) = test_message("svc", Bytes::new());
        let req = Request::new(msg, Context::background());
        req.respond("ok").unwrap();
        assert_eq!(rx.await.unwrap().data, Bytes::from("ok"));
        assert_eq!(req.respond("again"), Err(TransportError::AlreadyReplied));
    }
}
