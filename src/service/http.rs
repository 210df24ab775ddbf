use std::error::Error as StdError;
use std::future::Future;
use std::task::{Context, Poll};

use tower_service::Service;

use crate::body::Body;
use crate::{Request, Response};

/// An asynchronous function from `Request` to `Response`, shareable across
/// connections and streams.
pub trait HttpService: sealed::Sealed + Clone + Send + 'static {
    /// The error type that can occur within this `Service`.
    ///
    /// Note: Returning an `Error` to a server will cause the connection
    /// to be abruptly aborted (or, over HTTP/2, the stream reset). In most
    /// cases, it is better to return a `Response` with a 4xx or 5xx status
    /// code.
    type Error: Into<Box<dyn StdError + Send + Sync>> + Send;

    /// The `Future` returned by this `Service`.
    type Future: Future<Output = Result<Response<Body>, Self::Error>> + Send + 'static;

    #[doc(hidden)]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    #[doc(hidden)]
    fn call(&mut self, req: Request<Body>) -> Self::Future;
}

impl<T> HttpService for T
where
    T: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    T::Error: Into<Box<dyn StdError + Send + Sync>> + Send,
    T::Future: Send + 'static,
{
    type Error = T::Error;
    type Future = T::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::poll_ready(self, cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        Service::call(self, req)
    }
}

impl<T> sealed::Sealed for T where T: Service<Request<Body>, Response = Response<Body>> {}

mod sealed {
    pub trait Sealed {}
}
