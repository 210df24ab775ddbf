#![deny(warnings)]
#![deny(rust_2018_idioms)]

use h2c::client::{
    attach_clear_text_upgrade, Client, Http1Transport, Http2Transport, Protocol, Upgrader,
};
use h2c::{Body, Request, StatusCode, Uri, Version};

mod support;

fn uri(addr: std::net::SocketAddr, path: &str) -> Uri {
    format!("http://{}{}", addr, path).parse().unwrap()
}

fn upgrading_client() -> (Client, Upgrader) {
    let upgrader = Upgrader::new(Http1Transport::new(), Http2Transport::cleartext());
    (Client::with_transport(upgrader.clone()), upgrader)
}

#[tokio::test]
async fn h2c_server_is_spoken_to_over_http2() {
    let (addr, hits) = support::serve_h2c().await;
    let (client, upgrader) = upgrading_client();

    for path in &["/a", "/b", "/c"] {
        let res = client.get(uri(addr, path)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.version(), Version::HTTP_2);
        assert_eq!(
            res.into_body().into_bytes(),
            format!("HTTP/2.0 GET {} ", path)
        );
    }
    assert_eq!(
        upgrader.preference(&uri(addr, "/")),
        Some(Protocol::Http2)
    );
    // The upgrade request is answered by the cleartext handler itself.
    assert_eq!(hits.options(), 0);
    assert_eq!(hits.other(), 3);
}

#[tokio::test]
async fn http1_server_is_asked_once() {
    let (addr, hits) = support::serve_http1().await;
    let (client, upgrader) = upgrading_client();

    for _ in 0..3 {
        let res = client.get(uri(addr, "/plain")).await.unwrap();
        assert_eq!(res.version(), Version::HTTP_11);
        assert_eq!(res.into_body().into_bytes(), "HTTP/1.1 GET /plain ");
    }
    assert_eq!(
        upgrader.preference(&uri(addr, "/")),
        Some(Protocol::Http1)
    );
    assert_eq!(hits.options(), 1);
    assert_eq!(hits.other(), 3);
}

#[tokio::test]
async fn request_bodies_reach_the_server() {
    let (addr, _hits) = support::serve_h2c().await;
    let mut client = Client::new();
    attach_clear_text_upgrade(&mut client);

    let req = Request::post(uri(addr, "/upload"))
        .body(Body::from("payload"))
        .unwrap();
    let res = client.request(req).await.unwrap();
    assert_eq!(res.version(), Version::HTTP_2);
    assert_eq!(
        res.into_body().into_bytes(),
        "HTTP/2.0 POST /upload payload"
    );
}

#[tokio::test]
async fn unreachable_host_is_asked_again() {
    support::init_logging();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, upgrader) = upgrading_client();
    for _ in 0..2 {
        let err = client.get(uri(addr, "/")).await.unwrap_err();
        assert!(err.is_connect(), "{:?}", err);
        assert_eq!(upgrader.preference(&uri(addr, "/")), None);
    }
}

#[tokio::test]
async fn default_client_speaks_http1() {
    let (addr, hits) = support::serve_h2c().await;
    let client = Client::new();

    let res = client.get(uri(addr, "/")).await.unwrap();
    assert_eq!(res.version(), Version::HTTP_11);
    assert_eq!(hits.options(), 0);
}
