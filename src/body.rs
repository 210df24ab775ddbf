//! Message bodies.
//!
//! Bodies handled by this crate are fully buffered: the HTTP/1 and HTTP/2
//! paths both read the whole payload before handing a message on, which keeps
//! the negotiation logic free of streaming state. [`Body`] still implements
//! [`http_body::Body`] so it composes with the rest of the ecosystem.

use std::convert::Infallible;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body as HttpBody, SizeHint};

/// A buffered request or response body.
#[derive(Clone, Default, PartialEq)]
pub struct Body {
    bytes: Bytes,
}

impl Body {
    /// Create an empty `Body`.
    #[inline]
    pub fn empty() -> Body {
        Body::default()
    }

    /// Returns true if the body has no bytes left.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The number of bytes in the body.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Borrow the body's bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the body, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_data(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        if self.bytes.is_empty() {
            Poll::Ready(None)
        } else {
            Poll::Ready(Some(Ok(mem::take(&mut self.bytes))))
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        self.bytes.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.bytes.len() as u64)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("len", &self.bytes.len()).finish()
    }
}

impl From<Bytes> for Body {
    #[inline]
    fn from(bytes: Bytes) -> Body {
        Body { bytes }
    }
}

impl From<Vec<u8>> for Body {
    #[inline]
    fn from(vec: Vec<u8>) -> Body {
        Body::from(Bytes::from(vec))
    }
}

impl From<&'static [u8]> for Body {
    #[inline]
    fn from(slice: &'static [u8]) -> Body {
        Body::from(Bytes::from_static(slice))
    }
}

impl From<String> for Body {
    #[inline]
    fn from(s: String) -> Body {
        Body::from(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    #[inline]
    fn from(slice: &'static str) -> Body {
        Body::from(Bytes::from_static(slice.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::poll_fn;

    #[tokio::test]
    async fn poll_data_yields_once() {
        let mut body = Body::from("hello");
        assert_eq!(body.size_hint().exact(), Some(5));
        assert!(!body.is_end_stream());

        let chunk = poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await;
        assert_eq!(chunk.expect("chunk").expect("ok"), "hello");
        assert!(body.is_end_stream());

        let end = poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await;
        assert!(end.is_none());
    }

    #[test]
    fn empty_body() {
        let body = Body::empty();
        assert!(body.is_empty());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert_eq!(format!("{:?}", body), "Body { len: 0 }");
    }
}
