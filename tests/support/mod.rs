#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;

use h2c::server::{attach_clear_text_handler, Server};
use h2c::service::{service_fn, HttpService};
use h2c::{Body, Method, Request, Response};

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Counts the requests a test server handled, by method.
#[derive(Clone, Default)]
pub struct Hits {
    options: Arc<AtomicUsize>,
    other: Arc<AtomicUsize>,
}

impl Hits {
    pub fn options(&self) -> usize {
        self.options.load(Ordering::SeqCst)
    }

    pub fn other(&self) -> usize {
        self.other.load(Ordering::SeqCst)
    }
}

/// A server answering `<version> <method> <path> <body>`.
pub fn echo_server(hits: Hits) -> Server<impl HttpService> {
    Server::new(echo(hits))
}

fn echo(hits: Hits) -> impl HttpService {
    service_fn(move |req: Request<Body>| {
        let hits = hits.clone();
        async move {
            if req.method() == Method::OPTIONS {
                hits.options.fetch_add(1, Ordering::SeqCst);
            } else {
                hits.other.fetch_add(1, Ordering::SeqCst);
            }
            let (parts, body) = req.into_parts();
            let text = format!(
                "{:?} {} {} {}",
                parts.version,
                parts.method,
                parts.uri.path(),
                String::from_utf8_lossy(body.as_bytes()),
            );
            Ok::<_, Infallible>(Response::new(Body::from(text)))
        }
    })
}

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    (listener, addr)
}

/// Spawns an echo server that speaks h2c.
pub async fn serve_h2c() -> (SocketAddr, Hits) {
    init_logging();
    let hits = Hits::default();
    let server = attach_clear_text_handler(None, echo_server(hits.clone()));
    let (listener, addr) = listen().await;
    tokio::spawn(server.serve(listener));
    (addr, hits)
}

/// Spawns an echo server that speaks h2c and refuses request bodies over
/// `max_body_size` bytes.
pub async fn serve_h2c_limited(max_body_size: usize) -> (SocketAddr, Hits) {
    init_logging();
    let hits = Hits::default();
    let server = Server::builder()
        .max_body_size(max_body_size)
        .serve(echo(hits.clone()));
    let server = attach_clear_text_handler(None, server);
    let (listener, addr) = listen().await;
    tokio::spawn(server.serve(listener));
    (addr, hits)
}

/// Spawns an echo server that only speaks HTTP/1.1.
pub async fn serve_http1() -> (SocketAddr, Hits) {
    init_logging();
    let hits = Hits::default();
    let server = echo_server(hits.clone());
    let (listener, addr) = listen().await;
    tokio::spawn(server.serve(listener));
    (addr, hits)
}
