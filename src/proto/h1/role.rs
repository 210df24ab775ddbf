#[cfg(feature = "client")]
use std::fmt::{self, Write};

use bytes::{Bytes, BytesMut};
#[cfg(feature = "client")]
use http::header::HOST;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
#[cfg(feature = "server")]
use http::header::{CONNECTION, DATE};
#[cfg(feature = "client")]
use http::{request, Response};
use http::{HeaderMap, Method, StatusCode, Version};
#[cfg(feature = "server")]
use http::{response, Request, Uri};

#[cfg(feature = "server")]
use super::date;
use super::{Decoder, ParseResult};
use crate::error::Parse;
use crate::headers;
#[cfg(feature = "server")]
use crate::proto::h2::{PREFACE, PRI_LINE_LEN};

const MAX_HEADERS: usize = 100;
const AVERAGE_HEADER_SIZE: usize = 30; // totally scientific

// There are 2 roles, the server side parses requests and encodes responses,
// the client side does the reverse.

cfg_server! {
    /// Parses a request head off the front of `buf`.
    ///
    /// The first line of the HTTP/2 connection preface is accepted as a request
    /// of method `PRI`, target `*` and version HTTP/2.0, with no headers.
    pub(crate) fn parse_request(buf: &mut BytesMut) -> ParseResult<Request<()>> {
        skip_empty_lines(buf);
        if buf.is_empty() {
            return Ok(None);
        }

        let pri_line = &PREFACE[..PRI_LINE_LEN];
        if buf.len() < PRI_LINE_LEN && pri_line.starts_with(&buf[..]) {
            return Ok(None);
        }
        if buf.starts_with(pri_line) {
            trace!("Request.parse: HTTP/2 preface line");
            let _ = buf.split_to(PRI_LINE_LEN);
            let mut req = Request::new(());
            *req.method_mut() = Method::from_bytes(b"PRI").map_err(|_| Parse::Method)?;
            *req.uri_mut() = Uri::from_static("*");
            *req.version_mut() = Version::HTTP_2;
            return Ok(Some(req));
        }

        let mut headers_indices = [HeaderIndices {
            name: (0, 0),
            value: (0, 0),
        }; MAX_HEADERS];
        let (len, method, path, version, headers_len) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            trace!(
                "Request.parse([Header; {}], [u8; {}])",
                headers.len(),
                buf.len()
            );
            let mut req = httparse::Request::new(&mut headers);
            let bytes = buf.as_ref();
            match req.parse(bytes)? {
                httparse::Status::Complete(len) => {
                    trace!("Request.parse Complete({})", len);
                    let method = req
                        .method
                        .ok_or(Parse::Method)
                        .and_then(|m| Method::from_bytes(m.as_bytes()).map_err(|_| Parse::Method))?;
                    let path = req.path.ok_or(Parse::Uri)?;
                    let path_start = path.as_ptr() as usize - bytes.as_ptr() as usize;
                    let path = (path_start, path_start + path.len());
                    let version = if req.version == Some(1) {
                        Version::HTTP_11
                    } else {
                        Version::HTTP_10
                    };

                    record_header_indices(bytes, &req.headers, &mut headers_indices);
                    let headers_len = req.headers.len();
                    (len, method, path, version, headers_len)
                }
                httparse::Status::Partial => return Ok(None),
            }
        };

        let slice = buf.split_to(len).freeze();
        let uri = Uri::from_maybe_shared(slice.slice(path.0..path.1)).map_err(|_| Parse::Uri)?;
        let headers = headers_from_indices(&slice, &headers_indices[..headers_len])?;

        let mut req = Request::new(());
        *req.method_mut() = method;
        *req.uri_mut() = uri;
        *req.version_mut() = version;
        *req.headers_mut() = headers;
        Ok(Some(req))
    }

    // Empty lines ahead of a request line are ignored, even when they
    // arrive in the same read as the line itself.
    fn skip_empty_lines(buf: &mut BytesMut) {
        loop {
            if buf.starts_with(b"\r\n") {
                let _ = buf.split_to(2);
            } else if buf.starts_with(b"\n") {
                let _ = buf.split_to(1);
            } else {
                return;
            }
        }
    }

    /// Picks the body decoder for a request head.
    pub(crate) fn request_decoder(version: Version, headers: &HeaderMap) -> Result<Decoder, Parse> {
        // According to https://tools.ietf.org/html/rfc7230#section-3.3.3
        // 1. (irrelevant to Request)
        // 2. (irrelevant to Request)
        // 3. Transfer-Encoding: chunked has a chunked body.
        // 4. If multiple differing Content-Length headers or invalid, close connection.
        // 5. Content-Length header has a sized body.
        // 6. Length 0.
        // 7. (irrelevant to Request)

        if headers.contains_key(TRANSFER_ENCODING) {
            // If Transfer-Encoding header is present, and 'chunked' is
            // not the final encoding, and this is a Request, then it is
            // mal-formed. A server should respond with 400 Bad Request.
            if version == Version::HTTP_10 {
                debug!("HTTP/1.0 cannot have Transfer-Encoding header");
                Err(Parse::Header)
            } else if headers::transfer_encoding_is_chunked(headers) {
                Ok(Decoder::chunked())
            } else {
                debug!("request with transfer-encoding header, but not chunked, bad request");
                Err(Parse::Header)
            }
        } else {
            match headers::content_length_parse_all(headers) {
                Ok(Some(len)) => Ok(Decoder::length(len)),
                Ok(None) => Ok(Decoder::length(0)),
                Err(()) => {
                    debug!("illegal Content-Length header");
                    Err(Parse::Header)
                }
            }
        }
    }

    /// The status sent when a request could not be read.
    pub(crate) fn on_read_error(err: &crate::Error) -> Option<StatusCode> {
        let status = match err.kind() {
            crate::error::Kind::Parse(Parse::TooLarge) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            crate::error::Kind::Parse(_) => StatusCode::BAD_REQUEST,
            crate::error::Kind::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => return None,
        };
        debug!("sending automatic response ({}) for parse error", status);
        Some(status)
    }

    fn can_have_body(status: StatusCode) -> bool {
        !(status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED)
    }

    /// Writes a response head, and the body unless this answers a `HEAD`.
    pub(crate) fn encode_response(
        head: &response::Parts,
        body: &[u8],
        keep_alive: bool,
        req_method: &Method,
        dst: &mut Vec<u8>,
    ) {
        trace!(
            "Server::encode status={:?}, body={}, keep_alive={}",
            head.status,
            body.len(),
            keep_alive
        );

        let init_cap = 30 + head.headers.len() * AVERAGE_HEADER_SIZE + body.len();
        dst.reserve(init_cap);
        if head.version != Version::HTTP_10 && head.status == StatusCode::OK {
            extend(dst, b"HTTP/1.1 200 OK\r\n");
        } else {
            match head.version {
                Version::HTTP_10 => extend(dst, b"HTTP/1.0 "),
                _ => extend(dst, b"HTTP/1.1 "),
            }

            extend(dst, head.status.as_str().as_bytes());
            extend(dst, b" ");
            extend(
                dst,
                head.status
                    .canonical_reason()
                    .unwrap_or("<none>")
                    .as_bytes(),
            );
            extend(dst, b"\r\n");
        }

        let is_head = *req_method == Method::HEAD;
        let has_body = can_have_body(head.status);
        for (name, value) in &head.headers {
            if name == TRANSFER_ENCODING {
                continue;
            }
            // A HEAD response may announce the length of the body it omits.
            if name == CONTENT_LENGTH && !(is_head && has_body) {
                continue;
            }
            write_header(dst, name, value);
        }

        if has_body && !(is_head && head.headers.contains_key(CONTENT_LENGTH)) {
            write_content_length(dst, body.len() as u64);
        }

        if !keep_alive && !head.headers.contains_key(CONNECTION) {
            extend(dst, b"connection: close\r\n");
        }

        // using proto::h1::date is quite a lot faster than generating a unique
        // Date header each time
        if !head.headers.contains_key(DATE) {
            dst.reserve(date::DATE_VALUE_LENGTH + 8);
            extend(dst, b"date: ");
            date::update();
            date::extend(dst);
            extend(dst, b"\r\n");
        }
        extend(dst, b"\r\n");

        if has_body && !is_head {
            extend(dst, body);
        }
    }
}

cfg_client! {
    /// Parses a response head off the front of `buf`.
    pub(crate) fn parse_response(buf: &mut BytesMut) -> ParseResult<Response<()>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let mut headers_indices = [HeaderIndices {
            name: (0, 0),
            value: (0, 0),
        }; MAX_HEADERS];
        let (len, status, version, headers_len) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            trace!(
                "Response.parse([Header; {}], [u8; {}])",
                headers.len(),
                buf.len()
            );
            let mut res = httparse::Response::new(&mut headers);
            let bytes = buf.as_ref();
            match res.parse(bytes)? {
                httparse::Status::Complete(len) => {
                    trace!("Response.parse Complete({})", len);
                    let status = res
                        .code
                        .ok_or(Parse::Status)
                        .and_then(|code| StatusCode::from_u16(code).map_err(|_| Parse::Status))?;
                    let version = if res.version == Some(1) {
                        Version::HTTP_11
                    } else {
                        Version::HTTP_10
                    };
                    record_header_indices(bytes, &res.headers, &mut headers_indices);
                    let headers_len = res.headers.len();
                    (len, status, version, headers_len)
                }
                httparse::Status::Partial => return Ok(None),
            }
        };

        let slice = buf.split_to(len).freeze();
        let headers = headers_from_indices(&slice, &headers_indices[..headers_len])?;

        let mut res = Response::new(());
        *res.status_mut() = status;
        *res.version_mut() = version;
        *res.headers_mut() = headers;
        Ok(Some(res))
    }

    /// Picks the body decoder for a response head, given the request method.
    pub(crate) fn response_decoder(
        status: StatusCode,
        version: Version,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<Decoder, Parse> {
        // According to https://tools.ietf.org/html/rfc7230#section-3.3.3
        // 1. HEAD responses, and Status 1xx, 204, and 304 cannot have a body.
        // 2. Status 2xx to a CONNECT cannot have a body.
        // 3. Transfer-Encoding: chunked has a chunked body.
        // 4. If multiple differing Content-Length headers or invalid, close connection.
        // 5. Content-Length header has a sized body.
        // 6. (irrelevant to Response)
        // 7. Read till EOF.

        if status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || *method == Method::HEAD
            || (*method == Method::CONNECT && status.is_success())
        {
            return Ok(Decoder::length(0));
        }

        if headers.contains_key(TRANSFER_ENCODING) {
            if version == Version::HTTP_10 {
                debug!("HTTP/1.0 cannot have Transfer-Encoding header");
                Err(Parse::Header)
            } else if headers::transfer_encoding_is_chunked(headers) {
                Ok(Decoder::chunked())
            } else {
                trace!("not chunked, read till eof");
                Ok(Decoder::eof())
            }
        } else {
            match headers::content_length_parse_all(headers) {
                Ok(Some(len)) => Ok(Decoder::length(len)),
                Ok(None) => {
                    trace!("neither Transfer-Encoding nor Content-Length");
                    Ok(Decoder::eof())
                }
                Err(()) => {
                    debug!("illegal Content-Length header");
                    Err(Parse::Header)
                }
            }
        }
    }

    /// Writes a request head and body.
    ///
    /// The target is the origin-form path and query of the URI, or `*` for an
    /// asterisk-form URI. A `Host` header is added from the URI's authority if
    /// the request does not carry one.
    pub(crate) fn encode_request(head: &request::Parts, body: &[u8], dst: &mut Vec<u8>) {
        trace!(
            "Client::encode method={:?}, uri={:?}, body={}",
            head.method,
            head.uri,
            body.len()
        );

        let init_cap = 30 + head.headers.len() * AVERAGE_HEADER_SIZE + body.len();
        dst.reserve(init_cap);

        let target = head
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");

        extend(dst, head.method.as_str().as_bytes());
        extend(dst, b" ");
        extend(dst, target.as_bytes());
        match head.version {
            Version::HTTP_10 => extend(dst, b" HTTP/1.0\r\n"),
            _ => extend(dst, b" HTTP/1.1\r\n"),
        }

        if !head.headers.contains_key(HOST) {
            if let Some(authority) = head.uri.authority() {
                let _ = write!(FastWrite(dst), "host: {}\r\n", authority);
            }
        }

        for (name, value) in &head.headers {
            if name == TRANSFER_ENCODING || name == CONTENT_LENGTH {
                continue;
            }
            write_header(dst, name, value);
        }

        if !body.is_empty() || method_expects_body(&head.method) {
            write_content_length(dst, body.len() as u64);
        }
        extend(dst, b"\r\n");
        extend(dst, body);
    }

    fn method_expects_body(method: &Method) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH)
    }

    struct FastWrite<'a>(&'a mut Vec<u8>);

    impl<'a> fmt::Write for FastWrite<'a> {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            extend(self.0, s.as_bytes());
            Ok(())
        }

        #[inline]
        fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
            fmt::write(self, args)
        }
    }
}

fn write_content_length(dst: &mut Vec<u8>, len: u64) {
    extend(dst, b"content-length: ");
    extend(dst, itoa::Buffer::new().format(len).as_bytes());
    extend(dst, b"\r\n");
}

#[derive(Clone, Copy)]
struct HeaderIndices {
    name: (usize, usize),
    value: (usize, usize),
}

fn record_header_indices(
    bytes: &[u8],
    headers: &[httparse::Header<'_>],
    indices: &mut [HeaderIndices],
) {
    let bytes_ptr = bytes.as_ptr() as usize;
    for (header, indices) in headers.iter().zip(indices.iter_mut()) {
        let name_start = header.name.as_ptr() as usize - bytes_ptr;
        let name_end = name_start + header.name.len();
        indices.name = (name_start, name_end);
        let value_start = header.value.as_ptr() as usize - bytes_ptr;
        let value_end = value_start + header.value.len();
        indices.value = (value_start, value_end);
    }
}

fn headers_from_indices(slice: &Bytes, indices: &[HeaderIndices]) -> Result<HeaderMap, Parse> {
    let mut headers = HeaderMap::with_capacity(indices.len());
    for header in indices {
        let name = HeaderName::from_bytes(&slice[header.name.0..header.name.1])
            .map_err(|_| Parse::Header)?;
        let value = HeaderValue::from_maybe_shared(slice.slice(header.value.0..header.value.1))
            .map_err(|_| Parse::Header)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn write_header(dst: &mut Vec<u8>, name: &HeaderName, value: &HeaderValue) {
    extend(dst, name.as_str().as_bytes());
    extend(dst, b": ");
    extend(dst, value.as_bytes());
    extend(dst, b"\r\n");
}

#[inline]
fn extend(dst: &mut Vec<u8>, data: &[u8]) {
    dst.extend_from_slice(data);
}
