#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # h2c
//!
//! HTTP/2 over cleartext TCP, negotiated from an HTTP/1.1 stack.
//!
//! There are two ways a peer can ask for h2c:
//!
//! - **Prior knowledge**: the client opens the connection with the HTTP/2
//!   connection preface. An HTTP/1.1 parser sees this as a request line of
//!   `PRI * HTTP/2.0`.
//! - **Upgrade request**: the client sends an ordinary HTTP/1.1 request with
//!   `Upgrade: h2c`, and takes a `101 Switching Protocols` answer as a sign
//!   the server speaks h2c.
//!
//! On the server side, [`server::ClearText`] sits in front of an existing
//! handler. It answers upgrade requests, and hijacks prior-knowledge connections out of
//! the HTTP/1 loop and hands them to an HTTP/2 engine, replaying the bytes
//! the HTTP/1 parser already consumed.
//!
//! On the client side, [`client::Upgrader`] asks every destination once,
//! remembers the answer, and routes requests through either an HTTP/1 or an
//! HTTP/2 transport.
//!
//! ```no_run
//! # #[cfg(all(feature = "client", feature = "server"))]
//! # async fn run() -> h2c::Result<()> {
//! use std::convert::Infallible;
//!
//! use h2c::service::service_fn;
//! use h2c::{Body, Request, Response};
//!
//! let server = h2c::Server::new(service_fn(|_req: Request<Body>| async {
//!     Ok::<_, Infallible>(Response::new(Body::from("hello")))
//! }));
//! let server = h2c::server::attach_clear_text_handler(None, server);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
//!     .await
//!     .expect("bind");
//! tokio::spawn(server.serve(listener));
//!
//! let mut client = h2c::Client::new();
//! h2c::client::attach_clear_text_upgrade(&mut client);
//! let res = client.get("http://127.0.0.1:3000/".parse().unwrap()).await?;
//! assert_eq!(res.version(), h2c::Version::HTTP_2);
//! # Ok(())
//! # }
//! ```

#[doc(hidden)]
pub use http;

pub use http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri, Version};

pub use crate::body::Body;
pub use crate::error::{Error, Result};

#[cfg(feature = "client")]
pub use crate::client::Client;
#[cfg(feature = "server")]
pub use crate::server::Server;

#[macro_use]
mod cfg;
#[macro_use]
mod trace;

pub mod body;
mod common;
mod error;
mod headers;
#[cfg(feature = "server")]
pub mod hijack;
mod proto;
pub mod rt;
pub mod service;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
