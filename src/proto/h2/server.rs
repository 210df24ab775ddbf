use bytes::Bytes;
use futures_util::future::poll_fn;
use h2::server::{Builder, SendResponse};
use h2::{Reason, RecvStream};
use http::header::DATE;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Body;
use crate::common::exec::Exec;
use crate::headers;
use crate::proto::h1::date;
use crate::service::{oneshot, HttpService};
use crate::{Request, Response};

/// Serves HTTP/2 on `io` until the peer closes the connection.
///
/// Every stream is handled by its own clone of `service`, spawned on `exec`.
/// Request bodies longer than `max_body_size` are answered with 413.
pub(crate) async fn serve<T, S>(
    io: T,
    builder: &Builder,
    mut service: S,
    exec: &Exec,
    max_body_size: Option<usize>,
) -> crate::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: HttpService,
{
    let mut conn = builder
        .handshake::<T, Bytes>(io)
        .await
        .map_err(crate::Error::new_h2)?;
    trace!("http2 handshake complete");

    loop {
        // At first, polls the readiness of supplied service.
        if let Err(err) = poll_fn(|cx| service.poll_ready(cx)).await {
            let err = crate::Error::new_user_service(err);
            debug!("service closed: {}", err);

            let reason = err.h2_reason();
            if reason == Reason::NO_ERROR {
                // NO_ERROR is only used for graceful shutdowns...
                trace!("interpreting NO_ERROR user error as graceful_shutdown");
                conn.graceful_shutdown();
            } else {
                trace!("abruptly shutting down with {:?}", reason);
                conn.abrupt_shutdown(reason);
            }
            poll_fn(|cx| conn.poll_closed(cx))
                .await
                .map_err(crate::Error::new_h2)?;
            return Err(err);
        }

        // When the service is ready, accepts an incoming request.
        match conn.accept().await {
            Some(Ok((req, respond))) => {
                trace!("incoming request");
                let service = service.clone();
                exec.execute(async move {
                    if let Err(e) = serve_stream(service, req, respond, max_body_size).await {
                        debug!("stream error: {}", e);
                    }
                });
            }
            Some(Err(e)) => return Err(crate::Error::new_h2(e)),
            None => {
                // no more incoming streams...
                trace!("incoming connection complete");
                return Ok(());
            }
        }
    }
}

async fn serve_stream<S>(
    service: S,
    req: Request<RecvStream>,
    mut respond: SendResponse<Bytes>,
    max_body_size: Option<usize>,
) -> crate::Result<()>
where
    S: HttpService,
{
    let (parts, recv) = req.into_parts();
    let body = match super::collect(recv, max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            if err.is_body_too_large() {
                let mut res = Response::new(());
                *res.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                if let Err(e) = respond.send_response(res, true) {
                    debug!("send response error: {}", e);
                }
            }
            return Err(err);
        }
    };
    let req = Request::from_parts(parts, Body::from(body));

    let res = match oneshot(service, req).await {
        Ok(res) => res,
        Err(e) => {
            let err = crate::Error::new_user_service(e);
            warn!("http2 service errored: {}", err);
            respond.send_reset(err.h2_reason());
            return Err(err);
        }
    };

    let (head, body) = res.into_parts();
    let mut res = Response::from_parts(head, ());
    super::strip_connection_headers(res.headers_mut(), false);

    // set Date header if it isn't already set...
    res.headers_mut()
        .entry(DATE)
        .or_insert_with(date::update_and_header_value);

    let data = body.into_bytes();
    if has_body(res.status()) {
        headers::set_content_length_if_missing(res.headers_mut(), data.len() as u64);
    }

    if data.is_empty() {
        respond
            .send_response(res, true)
            .map_err(crate::Error::new_h2)?;
        return Ok(());
    }

    let mut body_tx = match respond.send_response(res, false) {
        Ok(tx) => tx,
        Err(e) => {
            debug!("send response error: {}", e);
            respond.send_reset(Reason::INTERNAL_ERROR);
            return Err(crate::Error::new_h2(e));
        }
    };
    super::send_body(&mut body_tx, data)
        .await
        .map_err(crate::Error::new_body_write)
}

fn has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}
