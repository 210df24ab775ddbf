//! Picking HTTP/1 or h2c per destination.
//!
//! The first request to a destination sends an upgrade request through the HTTP/1
//! transport:
//!
//! ```text
//! OPTIONS * HTTP/1.1
//! Host: <authority>
//! Upgrade: h2c
//! Connection: close
//! ```
//!
//! A `101 Switching Protocols` answer means the server speaks h2c, and every
//! request to that destination goes through the HTTP/2 transport from then
//! on. Any other answer pins the destination to HTTP/1. The answer is
//! remembered for the life of the [`Upgrader`], unless a
//! [`preference_ttl`](Builder::preference_ttl) is set.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use http::header::{HeaderValue, CONNECTION, HOST, UPGRADE};
use http::{Method, StatusCode, Uri};
use tokio::time::Instant;

use super::connect::Key;
use super::http2::Http2Transport;
use super::{Client, ResponseFuture, Transport};
use crate::body::Body;
use crate::{Request, Response};

/// The protocol chosen for a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// HTTP/1.1, through the HTTP/1 transport.
    Http1,
    /// HTTP/2 over cleartext, through the HTTP/2 transport.
    Http2,
}

/// A [`Transport`] that asks each destination once for h2c support and
/// routes requests accordingly.
#[derive(Clone)]
pub struct Upgrader {
    h1: Arc<dyn Transport>,
    h2: Arc<dyn Transport>,
    shared: Arc<Preferences>,
}

/// A builder to configure an [`Upgrader`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    preference_ttl: Option<Duration>,
}

struct Preferences {
    ttl: Option<Duration>,
    map: Mutex<HashMap<Key, Preference>>,
}

#[derive(Clone, Copy)]
struct Preference {
    protocol: Protocol,
    recorded: Instant,
}

/// Makes `client` negotiate h2c.
///
/// The client's transport, or the default HTTP/1 transport if it has none,
/// keeps serving HTTP/1 requests and upgrade requests. HTTP/2 requests go through a
/// new [`Http2Transport`] that dials plain TCP.
pub fn attach_clear_text_upgrade(client: &mut Client) {
    let h1 = client.take_transport().unwrap_or_else(super::default_transport);
    let h2: Arc<dyn Transport> = Arc::new(Http2Transport::cleartext());
    client.set_transport(Builder::default().build_arcs(h1, h2));
}

// ===== impl Builder =====

impl Builder {
    /// Forget a destination's protocol once it is older than `ttl`, so
    /// that the next request asks it again.
    ///
    /// Default is to never forget.
    pub fn preference_ttl(&mut self, ttl: Duration) -> &mut Self {
        self.preference_ttl = Some(ttl);
        self
    }

    /// Builds an upgrader over an HTTP/1 and an HTTP/2 transport.
    pub fn build<H1, H2>(&self, h1: H1, h2: H2) -> Upgrader
    where
        H1: Transport,
        H2: Transport,
    {
        self.build_arcs(Arc::new(h1), Arc::new(h2))
    }

    fn build_arcs(&self, h1: Arc<dyn Transport>, h2: Arc<dyn Transport>) -> Upgrader {
        Upgrader {
            h1,
            h2,
            shared: Arc::new(Preferences {
                ttl: self.preference_ttl,
                map: Mutex::new(HashMap::new()),
            }),
        }
    }
}

// ===== impl Upgrader =====

impl Upgrader {
    /// Creates an upgrader that never forgets a destination's protocol.
    pub fn new<H1, H2>(h1: H1, h2: H2) -> Upgrader
    where
        H1: Transport,
        H2: Transport,
    {
        Builder::default().build(h1, h2)
    }

    /// Starts a [`Builder`].
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The protocol currently remembered for the destination of `uri`.
    pub fn preference(&self, uri: &Uri) -> Option<Protocol> {
        let mut req = Request::new(());
        *req.uri_mut() = uri.clone();
        let key = Key::from_request(&req).ok()?;
        self.shared.lookup(&key)
    }

    async fn route(self, req: Request<Body>) -> crate::Result<Response<Body>> {
        let key = Key::from_request(&req)?;
        if !key.is_http() {
            // h2c is only spoken in cleartext.
            return self.h1.round_trip(req).await;
        }

        let protocol = match self.shared.lookup(&key) {
            Some(protocol) => protocol,
            None => {
                let learned = self.negotiate(&key).await?;
                self.shared.remember(key.clone(), learned)
            }
        };
        trace!("routing request to {} over {:?}", key, protocol);

        match protocol {
            Protocol::Http1 => self.h1.round_trip(req).await,
            Protocol::Http2 => self.h2.round_trip(req).await,
        }
    }

    async fn negotiate(&self, key: &Key) -> crate::Result<Protocol> {
        let mut ask = Request::new(Body::empty());
        *ask.method_mut() = Method::OPTIONS;
        *ask.uri_mut() = Uri::from_static("*");
        let host = HeaderValue::from_str(key.authority().as_str())
            .map_err(|_| crate::Error::new_user_absolute_uri_required())?;
        let headers = ask.headers_mut();
        headers.insert(HOST, host);
        headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        debug!("asking {} for h2c", key);
        let res = self.h1.round_trip(ask).await?;
        let protocol = if res.status() == StatusCode::SWITCHING_PROTOCOLS {
            Protocol::Http2
        } else {
            Protocol::Http1
        };
        debug!("upgrade request to {} answered {}, using {:?}", key, res.status(), protocol);
        Ok(protocol)
    }
}

impl Transport for Upgrader {
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture {
        Box::pin(self.clone().route(req))
    }
}

impl fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrader")
            .field("preference_ttl", &self.shared.ttl)
            .finish()
    }
}

// ===== impl Preferences =====

impl Preferences {
    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Preference>> {
        // Entries are inserted whole, so a poisoned map is still consistent.
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_fresh(&self, pref: &Preference, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(pref.recorded) < ttl,
            None => true,
        }
    }

    fn lookup(&self, key: &Key) -> Option<Protocol> {
        let now = Instant::now();
        let mut map = self.lock();
        let pref = *map.get(key)?;
        if self.is_fresh(&pref, now) {
            Some(pref.protocol)
        } else {
            trace!("protocol preference for {} expired", key);
            map.remove(key);
            None
        }
    }

    // Records `protocol` unless a fresh preference is already there, and
    // returns whichever is recorded.
    fn remember(&self, key: Key, protocol: Protocol) -> Protocol {
        let now = Instant::now();
        let mut map = self.lock();
        match map.get(&key).copied() {
            Some(existing) if self.is_fresh(&existing, now) => existing.protocol,
            _ => {
                map.insert(
                    key,
                    Preference {
                        protocol,
                        recorded: now,
                    },
                );
                protocol
            }
        }
    }
}
