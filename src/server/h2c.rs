use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::{HeaderValue, CONTENT_TYPE, UPGRADE};
use http::{StatusCode, Version};
use tower_service::Service;

use super::{Config, Http2, Server};
use crate::body::Body;
use crate::common::io::ForwardConn;
use crate::hijack::{self, Hijacked};
use crate::service::{oneshot, HttpService};
use crate::{Request, Response};

/// A handler that speaks h2c in front of another handler.
///
/// For each request:
///
/// - `Upgrade: h2c` is answered with `101 Switching Protocols` and no body.
///   The connection stays HTTP/1.1; the answer only tells the client that
///   this server speaks h2c.
/// - `PRI * HTTP/2.0`, the first line of the HTTP/2 connection preface, makes
///   it hijack the connection and serve HTTP/2 on it until the peer closes
///   it. Every HTTP/2 stream is handled by the delegate.
/// - Anything else goes to the delegate unchanged.
#[derive(Clone)]
pub struct ClearText<S> {
    h2: Http2,
    config: Config,
    delegate: S,
}

/// Puts a [`ClearText`] handler in front of the server's current handler.
///
/// `h2` configures the HTTP/2 engine; `None` uses the defaults. The server's
/// own [`Config`] is the engine's base configuration.
pub fn attach_clear_text_handler<S>(h2: Option<Http2>, server: Server<S>) -> Server<ClearText<S>> {
    server.map_handler(|delegate, config| ClearText::new(h2, config.clone(), delegate))
}

impl<S> ClearText<S> {
    /// Creates a cleartext handler in front of `delegate`.
    pub fn new(h2: Option<Http2>, config: Config, delegate: S) -> ClearText<S> {
        ClearText {
            h2: h2.unwrap_or_default(),
            config,
            delegate,
        }
    }

    /// The handler that receives everything that isn't h2c negotiation.
    pub fn delegate(&self) -> &S {
        &self.delegate
    }
}

impl<S> Service<Request<Body>> for ClearText<S>
where
    S: HttpService,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, S::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The delegate is driven to readiness per request, in `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        if is_upgrade_request(&req) {
            trace!("h2c upgrade request");
            return Box::pin(async { Ok::<_, S::Error>(switching_protocols()) });
        }

        if is_prior_knowledge(&req) {
            let h2 = self.h2.clone();
            let config = self.config.clone();
            let delegate = self.delegate.clone();
            return Box::pin(async move {
                let hijacker = match hijack::take(&mut req) {
                    Some(hijacker) => hijacker,
                    None => {
                        return Ok::<_, S::Error>(internal_error(
                            &crate::Error::new_user_no_hijack(),
                        ))
                    }
                };
                let Hijacked {
                    io,
                    read_buf,
                    write_buf,
                } = match hijacker.hijack().await {
                    Ok(hijacked) => hijacked,
                    Err(e) => return Ok::<_, S::Error>(internal_error(&e)),
                };

                let conn = ForwardConn::new(io, read_buf, &write_buf);
                debug!("serving h2c with prior knowledge: {:?}", conn);
                if let Err(e) = h2.serve_connection(conn, delegate, &config).await {
                    debug!("h2c connection error: {}", e);
                }
                // The connection was dropped, and so closed, when serving
                // returned. This response is never written.
                Ok::<_, S::Error>(Response::new(Body::empty()))
            });
        }

        Box::pin(oneshot(self.delegate.clone(), req))
    }
}

fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(UPGRADE)
        .map(|up| up == "h2c")
        .unwrap_or(false)
}

fn is_prior_knowledge<B>(req: &Request<B>) -> bool {
    req.method().as_str() == "PRI" && req.uri() == "*" && req.version() == Version::HTTP_2
}

fn switching_protocols() -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    res
}

fn internal_error(err: &crate::Error) -> Response<Body> {
    warn!("h2c hijack failed: {}", err);
    let mut res = Response::new(Body::from(format!("{}\n", err)));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = res.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    res
}

impl<S: fmt::Debug> fmt::Debug for ClearText<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearText")
            .field("h2", &self.h2)
            .field("delegate", &self.delegate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::service::service_fn;
    use http::Method;

    fn counting() -> (impl HttpService<Error = Infallible> + fmt::Debug, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let svc = service_fn(move |_req: Request<Body>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Response::new(Body::from("delegate")))
            }
        });
        (svc, seen)
    }

    fn clear_text<S>(delegate: S) -> ClearText<S> {
        ClearText::new(None, Config::default(), delegate)
    }

    #[tokio::test]
    async fn upgrade_request_gets_switching_protocols() {
        let (svc, hits) = counting();
        let mut h2c = clear_text(svc);
        let req = Request::options("*")
            .header(UPGRADE, "h2c")
            .header("connection", "close")
            .body(Body::empty())
            .expect("request");
        let res = Service::call(&mut h2c, req).await.expect("response");
        assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(res.body().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_upgrades_are_delegated() {
        let (svc, hits) = counting();
        let mut h2c = clear_text(svc);
        let req = Request::get("/chat")
            .header(UPGRADE, "websocket")
            .body(Body::empty())
            .expect("request");
        let res = Service::call(&mut h2c, req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.into_body().into_bytes(), "delegate");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prior_knowledge_without_hijacker_is_internal_error() {
        let (svc, hits) = counting();
        let mut h2c = clear_text(svc);
        let mut req = Request::new(Body::empty());
        *req.method_mut() = Method::from_bytes(b"PRI").expect("method");
        *req.uri_mut() = "*".parse().expect("uri");
        *req.version_mut() = Version::HTTP_2;

        let res = Service::call(&mut h2c, req).await.expect("response");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(
            res.into_body().into_bytes(),
            "connection does not support hijacking\n"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pri_over_http11_is_delegated() {
        let (svc, hits) = counting();
        let mut h2c = clear_text(svc);
        let mut req = Request::new(Body::empty());
        *req.method_mut() = Method::from_bytes(b"PRI").expect("method");
        *req.uri_mut() = "*".parse().expect("uri");

        let res = Service::call(&mut h2c, req).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn attach_keeps_delegate_and_config() {
        let server = Server::builder().max_buf_size(10_000).serve(7u8);
        let server = attach_clear_text_handler(None, server);
        assert_eq!(*server.handler().delegate(), 7u8);
        assert_eq!(server.handler().config.max_buf_size(), 10_000);
    }
}
