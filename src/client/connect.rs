//! Destinations and TCP dialing shared by the client transports.

use std::fmt;

use http::header::HOST;
use http::uri::{Authority, Scheme};
use tokio::net::TcpStream;

use crate::Request;

/// The destination a request is sent to: its scheme and authority.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    scheme: Scheme,
    authority: Authority,
}

impl Key {
    pub(crate) fn new(scheme: Scheme, authority: Authority) -> Key {
        Key { scheme, authority }
    }

    /// The destination of `req`.
    ///
    /// The authority comes from the URI, or from the `Host` header for
    /// origin-form and asterisk-form URIs. The scheme defaults to `http`.
    pub(crate) fn from_request<B>(req: &Request<B>) -> crate::Result<Key> {
        let uri = req.uri();
        let authority = match uri.authority() {
            Some(auth) => auth.clone(),
            None => req
                .headers()
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .and_then(|host| host.parse::<Authority>().ok())
                .ok_or_else(|| {
                    debug!("no destination in request to {}", uri);
                    crate::Error::new_user_absolute_uri_required()
                })?,
        };
        let scheme = uri.scheme().cloned().unwrap_or(Scheme::HTTP);
        Ok(Key::new(scheme, authority))
    }

    pub(crate) fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub(crate) fn authority(&self) -> &Authority {
        &self.authority
    }

    pub(crate) fn is_http(&self) -> bool {
        self.scheme == Scheme::HTTP
    }

    fn port(&self) -> u16 {
        match self.authority.port_u16() {
            Some(port) => port,
            None if self.scheme == Scheme::HTTPS => 443,
            None => 80,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Opens a TCP connection to the destination.
pub(crate) async fn connect(key: &Key, nodelay: bool) -> crate::Result<TcpStream> {
    let host = key.authority.host();
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = key.port();
    trace!("connecting to {}:{}", host, port);

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(crate::Error::new_connect)?;
    stream.set_nodelay(nodelay).map_err(crate::Error::new_connect)?;
    debug!("connected to {}", key);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;

    #[test]
    fn key_from_absolute_uri() {
        let req = Request::get("http://example.com:8080/a?b")
            .body(Body::empty())
            .unwrap();
        let key = Key::from_request(&req).unwrap();
        assert_eq!(key.to_string(), "http://example.com:8080");
        assert_eq!(key.port(), 8080);
    }

    #[test]
    fn key_from_host_header() {
        let req = Request::options("*")
            .header(HOST, "example.com")
            .body(Body::empty())
            .unwrap();
        let key = Key::from_request(&req).unwrap();
        assert!(key.is_http());
        assert_eq!(key.authority(), "example.com");
        assert_eq!(key.port(), 80);
    }

    #[test]
    fn https_default_port() {
        let req = Request::get("https://example.com/").body(Body::empty()).unwrap();
        let key = Key::from_request(&req).unwrap();
        assert!(!key.is_http());
        assert_eq!(key.port(), 443);
    }

    #[test]
    fn authority_is_case_insensitive() {
        let a = Key::from_request(&Request::get("http://EXAMPLE.com/").body(()).unwrap()).unwrap();
        let b = Key::from_request(&Request::get("http://example.com/x").body(()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_destination() {
        let req = Request::get("/relative").body(Body::empty()).unwrap();
        let err = Key::from_request(&req).unwrap_err();
        assert!(err.is_user());
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let key = Key::new(Scheme::HTTP, addr.to_string().parse().unwrap());
        let err = connect(&key, true).await.unwrap_err();
        assert!(err.is_connect());
    }
}
