//! HTTP clients that can negotiate h2c.
//!
//! A [`Client`] sends every request through a [`Transport`]. Out of the box
//! that is a process-wide [`Http1Transport`]; [`attach_clear_text_upgrade`]
//! replaces it with an [`Upgrader`] that asks each destination for h2c
//! support and uses HTTP/2 where the server speaks it.
//!
//! ```no_run
//! # async fn run() -> h2c::Result<()> {
//! use h2c::client::{attach_clear_text_upgrade, Client};
//!
//! let mut client = Client::new();
//! attach_clear_text_upgrade(&mut client);
//!
//! let res = client.get("http://127.0.0.1:8080/".parse().unwrap()).await?;
//! println!("{:?} {}", res.version(), res.status());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use tower_service::Service;

use crate::body::Body;
use crate::{Request, Response, Uri};

mod connect;
pub mod http1;
pub mod http2;
pub mod upgrade;

pub use self::http1::Http1Transport;
pub use self::http2::Http2Transport;
pub use self::upgrade::{attach_clear_text_upgrade, Protocol, Upgrader};

/// A `Future` that will resolve to an HTTP Response.
pub type ResponseFuture = Pin<Box<dyn Future<Output = crate::Result<Response<Body>>> + Send>>;

/// Something that sends a request and produces its response.
pub trait Transport: Send + Sync + 'static {
    /// Sends `req` and resolves to the response.
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture {
        (**self).round_trip(req)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn round_trip(&self, req: Request<Body>) -> ResponseFuture {
        (**self).round_trip(req)
    }
}

/// A Client to make outgoing HTTP requests.
///
/// Cloning a `Client` is cheap; clones share the transport.
#[derive(Clone, Default)]
pub struct Client {
    transport: Option<Arc<dyn Transport>>,
}

fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: OnceLock<Arc<dyn Transport>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(Http1Transport::new()))
        .clone()
}

impl Client {
    /// Create a new Client using the default transport.
    pub fn new() -> Client {
        Client::default()
    }

    /// Create a new Client sending requests through `transport`.
    pub fn with_transport<T: Transport>(transport: T) -> Client {
        let mut client = Client::new();
        client.set_transport(transport);
        client
    }

    /// Replaces the client's transport.
    pub fn set_transport<T: Transport>(&mut self, transport: T) {
        self.transport = Some(Arc::new(transport));
    }

    /// Removes the client's transport, leaving it on the default one.
    ///
    /// Returns `None` if the client was already using the default.
    pub fn take_transport(&mut self) -> Option<Arc<dyn Transport>> {
        self.transport.take()
    }

    /// The transport requests are currently sent through.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match self.transport {
            Some(ref transport) => transport.clone(),
            None => default_transport(),
        }
    }

    /// Send a `GET` request to the supplied `Uri`.
    pub fn get(&self, uri: Uri) -> ResponseFuture {
        let mut req = Request::new(Body::empty());
        *req.uri_mut() = uri;
        self.request(req)
    }

    /// Send a constructed `Request` using this `Client`.
    pub fn request(&self, req: Request<Body>) -> ResponseFuture {
        trace!("client request: {} {}", req.method(), req.uri());
        self.transport().round_trip(req)
    }
}

impl Service<Request<Body>> for Client {
    type Response = Response<Body>;
    type Error = crate::Error;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.request(req)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("default_transport", &self.transport.is_none())
            .finish()
    }
}
