//! Reply envelope for micro handlers.
use bytes::Bytes;
use micromw_core::Headers;

use super::MicroRequest;

/// A reply produced by a micro handler.
///
/// The endpoint sends it with
/// [`Delivery::respond`](crate::transport::Delivery::respond) once the chain
/// returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicroReply {
    pub headers: Headers,
    pub data: Bytes,
}

impl MicroReply {
    /// Create a reply with no headers.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            headers: Headers::new(),
            data: data.into(),
        }
    }

    /// Create a reply that carries a copy of the request's headers.
    pub fn from_request(data: impl Into<Bytes>, req: &MicroRequest) -> Self {
        Self {
            headers: req.headers.clone(),
            data: data.into(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_request_copies_headers() {
        let req = MicroRequest::new("s", "in").with_header("trace", "abc");
        let mut reply = MicroReply::from_request("out", &req);
        reply.headers_mut().set("extra", "1");

        assert_eq!(reply.headers.get("trace"), "abc");
        assert_eq!(reply.data, Bytes::from("out"));
        assert!(!req.headers.contains("extra"));
        assert!(MicroReply::new("x").headers.is_empty());
    }
}
