//! Request envelope for micro handlers.
use bytes::Bytes;
use micromw_core::Headers;

use crate::context::Context;
use crate::transport::Delivery;

/// An owned inbound request.
///
/// Unlike [`Request`](crate::Request), a `MicroRequest` holds its own copy
/// of the subject, headers and payload, so middleware can rewrite them (the
/// compression middleware replaces the payload) before calling the next
/// link. The context is only reachable through [`MicroRequest::context`] and
/// [`MicroRequest::with_context`].
#[derive(Debug, Clone, Default)]
pub struct MicroRequest {
    pub subject: String,
    pub reply: Option<String>,
    pub headers: Headers,
    pub data: Bytes,
    ctx: Context,
}

impl MicroRequest {
    /// Create a request with no headers and a background context.
    pub fn new(subject: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Copy a transport delivery into an owned request.
    pub fn from_message(message: &dyn Delivery, ctx: Context) -> Self {
        Self {
            subject: message.subject().to_string(),
            reply: message.reply().map(str::to_string),
            headers: message.headers().clone(),
            data: message.data().clone(),
            ctx,
        }
    }

    /// Set a header, builder style.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The request-scoped context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Return a new request carrying `ctx`.
    ///
    /// The payload is shared, not copied.
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            subject: self.subject.clone(),
            reply: self.reply.clone(),
            headers: self.headers.clone(),
            data: self.data.clone(),
            ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::test_message_with_headers;

    #[derive(Debug, PartialEq)]
    struct Tag(u32);

    #[test]
    fn test_from_message_copies_fields() {
        let mut headers = Headers::new();
        headers.set("encoding", "gzip");
        let (msg, _rx) = test_message_with_headers("a.b", headers, Bytes::from("data"));

        let req = MicroRequest::from_message(msg.as_ref(), Context::background().with_value(Tag(1)));
        assert_eq!(req.subject, "a.b");
        assert_eq!(req.reply.as_deref(), Some("_INBOX.test"));
        assert_eq!(req.headers.get("encoding"), "gzip");
        assert_eq!(req.data, Bytes::from("data"));
        assert_eq!(req.context().value::<Tag>(), Some(&Tag(1)));
    }

    #[test]
    fn test_with_context_is_a_new_value() {
        let original = MicroRequest::new("s", "x").with_header("k", "v");
        let derived = original.with_context(original.context().with_value(Tag(2)));

        assert_eq!(derived.context().value::<Tag>(), Some(&Tag(2)));
        assert_eq!(original.context().value::<Tag>(), None);
        assert_eq!(derived.headers.get("k"), "v");
        assert_eq!(derived.data.as_ptr(), original.data.as_ptr());
    }
}
