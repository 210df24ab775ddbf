//! The HTTP/1.1 client transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use http::header::{HeaderValue, HOST};
use http::{Method, StatusCode};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::connect::{self, Key};
use super::{ResponseFuture, Transport};
use crate::body::Body;
use crate::error::Kind;
use crate::headers;
use crate::proto::h1::{role, Buffered, Decoder};
use crate::{Request, Response};

type Conn = Buffered<TcpStream>;

/// Sends requests over HTTP/1.1 connections, keeping idle ones for reuse.
///
/// Only the `http` scheme is supported.
#[derive(Clone)]
pub struct Http1Transport {
    inner: Arc<Inner>,
}

/// A builder to configure an [`Http1Transport`].
#[derive(Clone, Debug)]
pub struct Builder {
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    nodelay: bool,
}

struct Inner {
    config: Builder,
    idle: Mutex<HashMap<Key, Vec<Idle>>>,
}

struct Idle {
    conn: Conn,
    idle_at: Instant,
}

// A failed exchange, and whether it may be retried on a new connection.
struct Failed {
    err: crate::Error,
    before_response: bool,
}

// ===== impl Builder =====

impl Builder {
    /// Sets the maximum idle connections kept per destination.
    ///
    /// Default is `usize::MAX` (no limit).
    pub fn pool_max_idle_per_host(&mut self, max_idle: usize) -> &mut Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }

    /// Sets how long an idle connection may wait to be reused.
    ///
    /// Pass `None` to keep idle connections forever.
    ///
    /// Default is 90 seconds.
    pub fn pool_idle_timeout<D>(&mut self, val: D) -> &mut Self
    where
        D: Into<Option<Duration>>,
    {
        self.pool_idle_timeout = val.into();
        self
    }

    /// Sets `TCP_NODELAY` on new connections.
    ///
    /// Default is `true`.
    pub fn nodelay(&mut self, nodelay: bool) -> &mut Self {
        self.nodelay = nodelay;
        self
    }

    /// Builds the transport.
    pub fn build(&self) -> Http1Transport {
        Http1Transport {
            inner: Arc::new(Inner {
                config: self.clone(),
                idle: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder {
            pool_max_idle_per_host: usize::MAX,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            nodelay: true,
        }
    }
}

// ===== impl Http1Transport =====

impl Http1Transport {
    /// Creates a transport with the default configuration.
    pub fn new() -> Http1Transport {
        Builder::default().build()
    }

    /// Starts a [`Builder`] with the default configuration.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The number of idle connections currently kept for reuse.
    pub fn idle_connections(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    async fn send(self, req: Request<Body>) -> crate::Result<Response<Body>> {
        let key = Key::from_request(&req)?;
        if !key.is_http() {
            debug!("http1 transport refusing {}", key);
            return Err(crate::Error::new_user_unsupported_scheme());
        }

        let (mut parts, body) = req.into_parts();
        if !parts.headers.contains_key(HOST) {
            if let Ok(host) = HeaderValue::from_str(key.authority().as_str()) {
                parts.headers.insert(HOST, host);
            }
        }
        let keep_alive = headers::should_keep_alive(parts.version, &parts.headers);
        let mut head = Vec::new();
        role::encode_request(&parts, body.as_bytes(), &mut head);

        if let Some(conn) = self.inner.checkout(&key) {
            trace!("reusing idle connection for {}", key);
            match exchange(conn, &head, &parts.method).await {
                Ok((res, conn)) => return Ok(self.finish(key, res, conn, keep_alive)),
                Err(Failed {
                    err,
                    before_response: true,
                }) => {
                    debug!("idle connection to {} failed ({}), retrying", key, err);
                }
                Err(failed) => return Err(failed.err),
            }
        }

        let io = connect::connect(&key, self.inner.config.nodelay).await?;
        match exchange(Buffered::new(io), &head, &parts.method).await {
            Ok((res, conn)) => Ok(self.finish(key, res, conn, keep_alive)),
            Err(failed) => Err(failed.err),
        }
    }

    fn finish(
        &self,
        key: Key,
        res: Response<Body>,
        conn: Option<Conn>,
        keep_alive: bool,
    ) -> Response<Body> {
        if let Some(conn) = conn {
            if keep_alive
                && res.status() != StatusCode::SWITCHING_PROTOCOLS
                && headers::should_keep_alive(res.version(), res.headers())
            {
                self.inner.put(key, conn);
            } else {
                trace!("not pooling connection to {}", key);
            }
        }
        res
    }
}

impl Default for Http1Transport {
    fn default() -> Http1Transport {
        Http1Transport::new()
    }
}

impl Transport for Http1Transport {
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture {
        Box::pin(self.clone().send(req))
    }
}

impl fmt::Debug for Http1Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Http1Transport")
            .field("config", &self.inner.config)
            .finish()
    }
}

// ===== impl Inner =====

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Vec<Idle>>> {
        // Idle lists are only pushed and popped, never left half-updated.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checkout(&self, key: &Key) -> Option<Conn> {
        let timeout = self.config.pool_idle_timeout;
        let now = Instant::now();
        let mut idle = self.lock();
        let list = idle.get_mut(key)?;
        let mut found = None;
        while let Some(entry) = list.pop() {
            match timeout {
                Some(timeout) if now.saturating_duration_since(entry.idle_at) > timeout => {
                    trace!("idle connection to {} expired", key);
                }
                _ => {
                    found = Some(entry.conn);
                    break;
                }
            }
        }
        if list.is_empty() {
            idle.remove(key);
        }
        found
    }

    fn put(&self, key: Key, conn: Conn) {
        let mut idle = self.lock();
        let list = idle.entry(key).or_insert_with(Vec::new);
        if list.len() < self.config.pool_max_idle_per_host {
            list.push(Idle {
                conn,
                idle_at: Instant::now(),
            });
        } else {
            trace!("idle pool full, dropping connection");
        }
    }
}

// Writes one request and reads its response, handing the connection back if
// it can carry another exchange.
async fn exchange(
    mut conn: Conn,
    head: &[u8],
    method: &Method,
) -> Result<(Response<Body>, Option<Conn>), Failed> {
    conn.write_buf().extend_from_slice(head);
    if let Err(e) = conn.flush().await {
        return Err(Failed {
            err: crate::Error::new_io(e),
            before_response: true,
        });
    }

    let head = loop {
        match conn.parse(role::parse_response).await {
            Ok(Some(head)) => {
                let status = head.status();
                if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                    trace!("ignoring informational response: {}", status);
                    continue;
                }
                break head;
            }
            Ok(None) => {
                return Err(Failed {
                    err: crate::Error::new_incomplete(),
                    before_response: true,
                })
            }
            Err(err) => {
                let before_response =
                    matches!(err.kind(), Kind::Io) && conn.read_buf().is_empty();
                return Err(Failed {
                    err,
                    before_response,
                });
            }
        }
    };
    trace!("response: {} {:?}", head.status(), head.version());

    let mut decoder = role::response_decoder(head.status(), head.version(), head.headers(), method)
        .map_err(|parse| Failed {
            err: crate::Error::from(parse),
            before_response: false,
        })?;
    let close_delimited = decoder == Decoder::eof();
    let body = decoder.decode_all(&mut conn, None).await.map_err(|err| Failed {
        err,
        before_response: false,
    })?;

    let (parts, ()) = head.into_parts();
    let res = Response::from_parts(parts, Body::from(body));
    let reusable = !close_delimited && conn.read_buf().is_empty();
    Ok((res, if reusable { Some(conn) } else { None }))
}
