//! Asynchronous services.
//!
//! A [`Service`](tower_service::Service) is a trait representing an
//! asynchronous function of a request to a response. It's similar to
//! `async fn(Request) -> Result<Response, Error>`.
//!
//! The HTTP/1 server, the HTTP/2 engine and the cleartext handler all drive
//! the same kind of service: anything implementing [`HttpService`]. That
//! trait is implemented for every `tower_service::Service` over
//! `Request<Body>` whose future is `Send`, so handlers written with
//! [`service_fn`] or with tower itself both fit.
//!
//! Since one handler serves every connection, it is cloned per connection
//! and, over HTTP/2, per stream.

pub use tower_service::Service;

mod http;
#[cfg(feature = "server")]
mod oneshot;
mod util;

pub use self::http::HttpService;
#[cfg(feature = "server")]
pub(crate) use self::oneshot::oneshot;
pub use self::util::{service_fn, ServiceFn};
