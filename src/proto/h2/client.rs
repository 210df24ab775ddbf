use bytes::Bytes;
use h2::client::{Builder, SendRequest};
use http::Version;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Body;
use crate::common::exec::Exec;
use crate::headers;
use crate::{Request, Response};

/// Performs the HTTP/2 handshake on `io` and spawns the connection driver.
pub(crate) async fn handshake<T>(
    io: T,
    builder: &Builder,
    exec: &Exec,
) -> crate::Result<SendRequest<Bytes>>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, conn) = builder
        .handshake::<T, Bytes>(io)
        .await
        .map_err(crate::Error::new_h2)?;
    trace!("http2 handshake complete, spawning background dispatcher task");

    exec.execute(async move {
        if let Err(e) = conn.await {
            debug!("client connection error: {}", e);
        }
    });
    Ok(tx)
}

/// Sends one request on an HTTP/2 connection and buffers the response.
pub(crate) async fn send_request(
    tx: SendRequest<Bytes>,
    req: Request<Body>,
) -> crate::Result<Response<Body>> {
    let mut tx = tx.ready().await.map_err(crate::Error::new_h2)?;

    let (mut parts, body) = req.into_parts();
    super::strip_connection_headers(&mut parts.headers, true);
    parts.version = Version::HTTP_2;

    let data = body.into_bytes();
    if !data.is_empty() {
        headers::set_content_length_if_missing(&mut parts.headers, data.len() as u64);
    }

    let eos = data.is_empty();
    let (fut, mut body_tx) = tx
        .send_request(Request::from_parts(parts, ()), eos)
        .map_err(|e| {
            debug!("client send request error: {}", e);
            crate::Error::new_h2(e)
        })?;

    if !eos {
        super::send_body(&mut body_tx, data)
            .await
            .map_err(crate::Error::new_body_write)?;
    }

    let res = fut.await.map_err(crate::Error::new_h2)?;
    let (parts, recv) = res.into_parts();
    let body = super::collect(recv, None).await?;
    Ok(Response::from_parts(parts, Body::from(body)))
}
