use bytes::{Bytes, BytesMut};
use futures_util::future::poll_fn;
use h2::{Reason, RecvStream, SendStream};
use http::header::{
    HeaderName, CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use http::HeaderMap;

#[cfg(feature = "client")]
pub(crate) mod client;
#[cfg(feature = "server")]
pub(crate) mod server;

cfg_server! {
    /// The HTTP/2 client connection preface.
    pub(crate) const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

    /// How much of the preface an HTTP/1 parser consumes as a request head:
    /// `PRI * HTTP/2.0\r\n\r\n`.
    pub(crate) const PRI_LINE_LEN: usize = 18;
}

fn strip_connection_headers(headers: &mut HeaderMap, is_request: bool) {
    // List of connection headers from:
    // https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Connection
    //
    // TE headers are allowed in HTTP/2 requests as long as the value is "trailers", so they're
    // tested separately.
    let connection_headers = [
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-connection"),
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ];

    for header in connection_headers.iter() {
        if headers.remove(header).is_some() {
            warn!("Connection header illegal in HTTP/2: {}", header.as_str());
        }
    }

    if is_request {
        if headers
            .get(TE)
            .map(|te_header| te_header != "trailers")
            .unwrap_or(false)
        {
            warn!("TE headers not set to \"trailers\" are illegal in HTTP/2 requests");
            headers.remove(TE);
        }
    } else if headers.remove(TE).is_some() {
        warn!("TE headers illegal in HTTP/2 responses");
    }

    if let Some(header) = headers.remove(CONNECTION) {
        warn!(
            "Connection header illegal in HTTP/2: {}",
            CONNECTION.as_str()
        );
        // A `Connection` header may have a comma-separated list of names of other headers that
        // are meant for only this specific connection.
        //
        // Iterate these names and remove them as headers. Connection-specific headers are
        // forbidden in HTTP2, as that information has been moved into frame types of the h2
        // protocol.
        if let Ok(header_contents) = header.to_str() {
            for name in header_contents.split(',') {
                let name = name.trim();
                headers.remove(name);
            }
        }
    }
}

// body adapters used by both Client and Server

/// Reads a whole stream, handing flow-control capacity back as data arrives.
///
/// Stops with an error once more than `limit` bytes have arrived.
async fn collect(mut body: RecvStream, limit: Option<usize>) -> crate::Result<Bytes> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(crate::Error::new_body)?;
        trace!("recv body chunk: {} bytes", chunk.len());
        let _ = body.flow_control().release_capacity(chunk.len());
        if buf.len().saturating_add(chunk.len()) > limit {
            debug!("body is over the limit of {}", limit);
            return Err(crate::Error::new_body_too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Sends `data` as DATA frames, the last one ending the stream.
async fn send_body(body_tx: &mut SendStream<Bytes>, mut data: Bytes) -> Result<(), h2::Error> {
    while !data.is_empty() {
        body_tx.reserve_capacity(data.len());

        let mut cap = body_tx.capacity();
        while cap == 0 {
            cap = match poll_fn(|cx| body_tx.poll_capacity(cx)).await {
                Some(res) => res?,
                None => return Err(h2::Error::from(Reason::CANCEL)),
            };
        }

        let chunk = data.split_to(cap.min(data.len()));
        let is_eos = data.is_empty();
        trace!("send body chunk: {} bytes, eos={}", chunk.len(), is_eos);
        body_tx.send_data(chunk, is_eos)?;
    }
    Ok(())
}
