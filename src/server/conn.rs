use http::header::CONNECTION;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Config;
use crate::body::Body;
use crate::headers;
use crate::hijack::{self, Hijacked};
use crate::proto::h1::{role, Buffered};
use crate::proto::Dispatched;
use crate::service::{oneshot, HttpService};
use crate::{Request, Response};

/// Runs the HTTP/1 loop on one connection.
pub(super) async fn serve_connection<I, S>(
    io: I,
    service: S,
    config: Config,
) -> crate::Result<Dispatched>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: HttpService,
{
    let mut io = Buffered::new(io);
    io.set_max_buf_size(config.max_buf_size);

    loop {
        let head = match io.parse(role::parse_request).await {
            Ok(Some(head)) => head,
            Ok(None) => {
                trace!("connection closed by peer between requests");
                return Ok(Dispatched::Shutdown);
            }
            Err(e) => {
                debug!("parse error ({}) with {} bytes", e, io.read_buf().len());
                respond_to_read_error(&mut io, &e).await;
                return Err(e);
            }
        };
        trace!(
            "incoming request: {} {} {:?}",
            head.method(),
            head.uri(),
            head.version()
        );

        let mut decoder = match role::request_decoder(head.version(), head.headers()) {
            Ok(decoder) => decoder,
            Err(parse) => {
                let e = crate::Error::from(parse);
                respond_to_read_error(&mut io, &e).await;
                return Err(e);
            }
        };
        let body = match decoder.decode_all(&mut io, config.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                respond_to_read_error(&mut io, &e).await;
                return Err(e);
            }
        };

        let mut keep_alive =
            config.keep_alive && headers::should_keep_alive(head.version(), head.headers());
        let method = head.method().clone();

        let (parts, ()) = head.into_parts();
        let mut req = Request::from_parts(parts, Body::from(body));
        let (hijacker, mut pending) = hijack::pending();
        req.extensions_mut().insert(hijacker);

        let fut = oneshot(service.clone(), req);
        tokio::pin!(fut);

        let res = tokio::select! {
            res = &mut fut => res,
            Ok(reply) = &mut pending.rx => {
                debug!("connection hijacked by handler");
                let (io, read_buf, write_buf) = io.into_inner();
                let hijacked = Hijacked {
                    io: Box::new(io),
                    read_buf,
                    write_buf,
                };
                if reply.send(Ok(hijacked)).is_err() {
                    debug!("hijacking handler went away before taking the connection");
                }
                // The response of a hijacking handler is never written.
                if let Err(e) = fut.await {
                    debug!("hijacking handler errored: {}", crate::Error::new_user_service(e));
                }
                return Ok(Dispatched::Hijacked);
            }
        };

        let res: Response<Body> = match res {
            Ok(res) => res,
            Err(e) => {
                let err = crate::Error::new_user_service(e);
                debug!("service errored, closing connection: {}", err);
                return Err(err);
            }
        };

        let (parts, body) = res.into_parts();
        if parts
            .headers
            .get(CONNECTION)
            .map(headers::connection_close)
            .unwrap_or(false)
        {
            keep_alive = false;
        }
        role::encode_response(&parts, body.as_bytes(), keep_alive, &method, io.write_buf());
        io.flush().await.map_err(crate::Error::new_io)?;

        if !keep_alive {
            trace!("not keep-alive, shutting down");
            let _ = io.shutdown().await;
            return Ok(Dispatched::Shutdown);
        }
    }
}

async fn respond_to_read_error<I>(io: &mut Buffered<I>, err: &crate::Error)
where
    I: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(status) = role::on_read_error(err) {
        let mut res = Response::new(());
        *res.status_mut() = status;
        let (parts, ()) = res.into_parts();
        role::encode_response(&parts, &[], false, &http::Method::GET, io.write_buf());
        if let Err(e) = io.flush().await {
            debug!("error writing {} response: {}", status, e);
        }
    }
    let _ = io.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::service::service_fn;

    fn echo() -> impl HttpService {
        service_fn(|req: Request<Body>| async move {
            let method = req.method().clone();
            let body = format!("{} {}", method, req.into_body().len());
            Ok::<_, Infallible>(Response::new(Body::from(body)))
        })
    }

    async fn exchange<S: HttpService>(service: S, config: Config, input: &'static [u8]) -> String {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let conn = tokio::spawn(serve_connection(server, service, config));
        let (mut rd, mut wr) = tokio::io::split(client);
        wr.write_all(input).await.expect("write");
        wr.shutdown().await.expect("shutdown");
        let mut out = Vec::new();
        rd.read_to_end(&mut out).await.expect("read");
        let _ = conn.await.expect("join");
        String::from_utf8(out).expect("utf8")
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let out = exchange(
            echo(),
            Config::default(),
            b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\
              POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello\
              POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n",
        )
        .await;
        assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 3, "{:?}", out);
        assert!(out.contains("\r\n\r\nGET 0"), "{:?}", out);
        assert!(out.contains("\r\n\r\nPOST 5"), "{:?}", out);
        assert!(out.ends_with("\r\n\r\nPOST 3"), "{:?}", out);
    }

    #[tokio::test]
    async fn connection_close_ends_loop() {
        let out = exchange(
            echo(),
            Config::default(),
            b"GET / HTTP/1.1\r\nConnection: close\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;
        assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 1, "{:?}", out);
        assert!(out.contains("connection: close\r\n"), "{:?}", out);
    }

    #[tokio::test]
    async fn keep_alive_disabled() {
        let config = Config {
            keep_alive: false,
            ..Config::default()
        };
        let out = exchange(echo(), config, b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 1, "{:?}", out);
    }

    #[tokio::test]
    async fn bad_request_on_parse_error() {
        let out = exchange(echo(), Config::default(), b"GET / HTTP/1.1\r\nBad Header\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{:?}", out);
    }

    #[tokio::test]
    async fn header_fields_too_large() {
        let config = Config {
            max_buf_size: 8192,
            ..Config::default()
        };
        let mut input = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(9000));
        let input: &'static [u8] = Box::leak(input.into_boxed_slice());
        let out = exchange(echo(), config, input).await;
        assert!(
            out.starts_with("HTTP/1.1 431 Request Header Fields Too Large\r\n"),
            "{:?}",
            out
        );
    }

    #[tokio::test]
    async fn payload_too_large() {
        let config = Config {
            max_body_size: Some(4),
            ..Config::default()
        };
        let out = exchange(
            echo(),
            config.clone(),
            b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nfour\
              POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await;
        assert!(out.contains("\r\n\r\nPOST 4HTTP/1.1 413 Payload Too Large\r\n"), "{:?}", out);
        assert!(out.contains("connection: close\r\n"), "{:?}", out);

        let out = exchange(
            echo(),
            config,
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n3\r\ndef\r\n0\r\n\r\n",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{:?}", out);
    }

    #[tokio::test]
    async fn handler_hijacks_connection() {
        let svc = service_fn(|mut req: Request<Body>| async move {
            let hijacker = hijack::take(&mut req).expect("hijacker");
            let mut hijacked = hijacker.hijack().await.expect("hijack");
            assert!(hijacked.write_buf.is_empty());
            let read_buf = hijacked.read_buf.clone();
            hijacked.io.write_all(&read_buf).await.expect("echo buffered");
            let mut live = [0u8; 4];
            hijacked.io.read_exact(&mut live).await.expect("read live");
            hijacked.io.write_all(&live).await.expect("echo live");
            hijacked.io.shutdown().await.expect("shutdown");
            Ok::<_, Infallible>(Response::new(Body::from("never written")))
        });

        let (mut client, server) = tokio::io::duplex(1024);
        let conn = tokio::spawn(serve_connection(server, svc, Config::default()));

        client
            .write_all(b"GET /hijack HTTP/1.1\r\n\r\nbuffered")
            .await
            .expect("write");
        let mut buffered = [0u8; 8];
        client.read_exact(&mut buffered).await.expect("read buffered");
        assert_eq!(&buffered, b"buffered");

        client.write_all(b"live").await.expect("write live");
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.expect("read");
        assert_eq!(Bytes::from(out), "live");

        let dispatched = conn.await.expect("join").expect("serve");
        assert!(matches!(dispatched, Dispatched::Hijacked));
    }
}
