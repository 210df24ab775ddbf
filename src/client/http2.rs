//! The HTTP/2 client transport.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use h2::client::SendRequest;
use http::header::HOST;
use http::Uri;

use super::connect::{self, Key};
use super::{ResponseFuture, Transport};
use crate::body::Body;
use crate::common::exec::{BoxSendFuture, Exec, Executor};
use crate::proto;
use crate::{Request, Response};

/// Sends requests over HTTP/2, one connection per destination.
///
/// This transport has no TLS, so the only destinations it can reach are
/// `http` ones spoken to as h2c, which must be allowed explicitly with
/// [`Http2Transport::cleartext`] or [`Builder::allow_cleartext`].
#[derive(Clone)]
pub struct Http2Transport {
    inner: Arc<Inner>,
}

/// A builder to configure an [`Http2Transport`].
#[derive(Clone, Debug)]
pub struct Builder {
    allow_cleartext: bool,
    nodelay: bool,
    h2_builder: h2::client::Builder,
    exec: Exec,
}

struct Inner {
    config: Builder,
    conns: Mutex<HashMap<Key, SendRequest<Bytes>>>,
}

// ===== impl Builder =====

impl Builder {
    /// Sets whether `http` destinations are spoken to as h2c.
    ///
    /// Default is `false`.
    pub fn allow_cleartext(&mut self, enabled: bool) -> &mut Self {
        self.allow_cleartext = enabled;
        self
    }

    /// Sets `TCP_NODELAY` on new connections.
    ///
    /// Default is `true`.
    pub fn nodelay(&mut self, nodelay: bool) -> &mut Self {
        self.nodelay = nodelay;
        self
    }

    /// Sets the [`SETTINGS_INITIAL_WINDOW_SIZE`][spec] option for HTTP2
    /// stream-level flow control.
    ///
    /// Passing `None` will do nothing.
    ///
    /// [spec]: https://http2.github.io/http2-spec/#SETTINGS_INITIAL_WINDOW_SIZE
    pub fn initial_stream_window_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.h2_builder.initial_window_size(sz);
        }
        self
    }

    /// Sets the max connection-level flow control for HTTP2.
    ///
    /// Passing `None` will do nothing.
    pub fn initial_connection_window_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.h2_builder.initial_connection_window_size(sz);
        }
        self
    }

    /// Sets the maximum frame size to use for HTTP2.
    ///
    /// Passing `None` will do nothing.
    pub fn max_frame_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.h2_builder.max_frame_size(sz);
        }
        self
    }

    /// Set the executor used to drive HTTP/2 connections in the background.
    ///
    /// Default uses implicit default (like `tokio::spawn`).
    pub fn executor<E>(&mut self, exec: E) -> &mut Self
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        self.exec = Exec::new(exec);
        self
    }

    /// Builds the transport.
    pub fn build(&self) -> Http2Transport {
        Http2Transport {
            inner: Arc::new(Inner {
                config: self.clone(),
                conns: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for Builder {
    fn default() -> Builder {
        let mut h2_builder = h2::client::Builder::default();
        // Pushes are never accepted.
        h2_builder.enable_push(false);
        Builder {
            allow_cleartext: false,
            nodelay: true,
            h2_builder,
            exec: Exec::Default,
        }
    }
}

// ===== impl Http2Transport =====

impl Http2Transport {
    /// Creates a transport that refuses cleartext destinations.
    pub fn new() -> Http2Transport {
        Builder::default().build()
    }

    /// Creates a transport that speaks h2c to `http` destinations.
    pub fn cleartext() -> Http2Transport {
        Builder::default().allow_cleartext(true).build()
    }

    /// Starts a [`Builder`] with the default configuration.
    pub fn builder() -> Builder {
        Builder::default()
    }

    async fn send(self, mut req: Request<Body>) -> crate::Result<Response<Body>> {
        let key = Key::from_request(&req)?;
        if !key.is_http() || !self.inner.config.allow_cleartext {
            debug!("http2 transport refusing {}", key);
            return Err(crate::Error::new_user_unsupported_scheme());
        }

        if req.uri().authority().is_none() {
            *req.uri_mut() = absolute(&key, req.uri())?;
        }
        // The authority travels as `:authority`.
        req.headers_mut().remove(HOST);

        let tx = self.connection(&key).await?;
        proto::h2::client::send_request(tx, req).await
    }

    // A ready connection to `key`, reusing the cached one while it lasts.
    async fn connection(&self, key: &Key) -> crate::Result<SendRequest<Bytes>> {
        let cached = self.inner.lock().get(key).cloned();
        if let Some(tx) = cached {
            match tx.ready().await {
                Ok(tx) => return Ok(tx),
                Err(e) => {
                    debug!("cached http2 connection to {} unusable: {}", key, e);
                    self.inner.lock().remove(key);
                }
            }
        }

        let io = connect::connect(key, self.inner.config.nodelay).await?;
        let config = &self.inner.config;
        let tx = proto::h2::client::handshake(io, &config.h2_builder, &config.exec).await?;

        // Requests racing to the same destination share the first
        // connection cached. Ours closes once `tx` is dropped.
        match self.inner.lock().entry(key.clone()) {
            Entry::Occupied(cached) => {
                debug!("reusing http2 connection to {} cached while dialing", key);
                Ok(cached.get().clone())
            }
            Entry::Vacant(slot) => Ok(slot.insert(tx).clone()),
        }
    }
}

fn absolute(key: &Key, uri: &Uri) -> crate::Result<Uri> {
    let path = match uri.path_and_query() {
        Some(pq) if !pq.as_str().is_empty() => pq.clone(),
        _ => http::uri::PathAndQuery::from_static("/"),
    };
    Uri::builder()
        .scheme(key.scheme().clone())
        .authority(key.authority().clone())
        .path_and_query(path)
        .build()
        .map_err(|_| crate::Error::new_user_absolute_uri_required())
}

impl Default for Http2Transport {
    fn default() -> Http2Transport {
        Http2Transport::new()
    }
}

impl Transport for Http2Transport {
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture {
        Box::pin(self.clone().send(req))
    }
}

impl fmt::Debug for Http2Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Http2Transport")
            .field("allow_cleartext", &self.inner.config.allow_cleartext)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Key, SendRequest<Bytes>>> {
        self.conns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::uri::Scheme;
    use http::{StatusCode, Version};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refuses_cleartext_by_default() {
        let transport = Http2Transport::new();
        let req = Request::get("http://127.0.0.1:1/").body(Body::empty()).unwrap();
        let err = transport.round_trip(req).await.unwrap_err();
        assert!(err.is_user());
    }

    #[tokio::test]
    async fn refuses_https() {
        let transport = Http2Transport::cleartext();
        let req = Request::get("https://127.0.0.1:1/").body(Body::empty()).unwrap();
        let err = transport.round_trip(req).await.unwrap_err();
        assert!(err.is_user());
    }

    #[test]
    fn absolute_from_host() {
        let key = Key::new(Scheme::HTTP, "example.com:81".parse().unwrap());
        let uri = absolute(&key, &"/a?b=c".parse().unwrap()).unwrap();
        assert_eq!(uri, "http://example.com:81/a?b=c");
    }

    #[tokio::test]
    async fn reuses_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = h2::server::handshake(stream).await.unwrap();
            while let Some(Ok((req, mut respond))) = conn.accept().await {
                let path = req.uri().path().to_owned();
                let res = http::Response::builder().status(200).body(()).unwrap();
                let mut send = respond.send_response(res, false).unwrap();
                send.send_data(Bytes::from(path), true).unwrap();
            }
        });

        let transport = Http2Transport::cleartext();
        for path in &["/one", "/two"] {
            let req = Request::get(format!("http://{}{}", addr, path))
                .body(Body::empty())
                .unwrap();
            let res = transport.round_trip(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.version(), Version::HTTP_2);
            assert_eq!(res.into_body().into_bytes(), *path);
        }
        assert_eq!(transport.inner.lock().len(), 1);
    }

    #[tokio::test]
    async fn racing_first_requests_share_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let id = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut conn = h2::server::handshake(stream).await.unwrap();
                    while let Some(Ok((_req, mut respond))) = conn.accept().await {
                        let res = http::Response::builder().status(200).body(()).unwrap();
                        let mut send = respond.send_response(res, false).unwrap();
                        send.send_data(Bytes::from(id.to_string()), true).unwrap();
                    }
                });
            }
        });

        let transport = Http2Transport::cleartext();
        let get = || {
            let req = Request::get(format!("http://{}/", addr))
                .body(Body::empty())
                .unwrap();
            transport.round_trip(req)
        };

        let (a, b) = tokio::join!(get(), get());
        a.unwrap();
        b.unwrap();
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(transport.inner.lock().len(), 1);

        let third = get().await.unwrap().into_body().into_bytes();
        let fourth = get().await.unwrap().into_body().into_bytes();
        assert_eq!(third, fourth);
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }
}
