//! Error and Result module.
use std::error::Error as StdError;
use std::fmt;

/// Result type often returned from methods that can have h2c `Error`s.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur negotiating or speaking HTTP.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    Parse(Parse),
    User(User),
    /// A message reached EOF, but is not complete.
    Incomplete,
    /// A pending item was dropped before ever being processed.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    Canceled,
    /// Indicates a channel (client or hijack) is closed.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    ChannelClosed,
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io,
    /// Error occurred while connecting.
    #[cfg_attr(not(feature = "client"), allow(dead_code))]
    Connect,
    /// Error accepting on a listener.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    Accept,
    /// Error while reading a body from connection.
    Body,
    /// A body was longer than the configured limit.
    BodyTooLarge,
    /// Error while writing a body to connection.
    BodyWrite,
    /// A general error from h2.
    Http2,
}

#[derive(Debug)]
pub(crate) enum Parse {
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    Method,
    Version,
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    Uri,
    Header,
    TooLarge,
    Status,
}

#[derive(Debug)]
pub(crate) enum User {
    /// Error from the `Future` of a user's `Service`.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    Service,
    /// The request did not arrive on a connection that can be hijacked.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    NoHijack,
    /// The request's destination could not be determined.
    #[cfg_attr(not(feature = "client"), allow(dead_code))]
    AbsoluteUriRequired,
    /// The transport cannot speak to this scheme.
    #[cfg_attr(not(feature = "client"), allow(dead_code))]
    UnsupportedScheme,
}

impl Error {
    /// Returns true if this was an HTTP parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if this error was caused by user code.
    pub fn is_user(&self) -> bool {
        matches!(self.inner.kind, Kind::User(_))
    }

    /// Returns true if this was about a pending operation that was canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    /// Returns true if a sender's channel is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.kind, Kind::ChannelClosed)
    }

    /// Returns true if this was an error from connecting to a destination.
    pub fn is_connect(&self) -> bool {
        matches!(self.inner.kind, Kind::Connect)
    }

    /// Returns true if the connection closed before a message could complete.
    pub fn is_incomplete(&self) -> bool {
        matches!(self.inner.kind, Kind::Incomplete)
    }

    /// Returns true if a message body was longer than the configured limit.
    pub fn is_body_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::BodyTooLarge)
    }

    /// Consumes the error, returning its cause.
    pub fn into_cause(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.inner.cause
    }

    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    #[cfg(feature = "server")]
    pub(crate) fn h2_reason(&self) -> h2::Reason {
        // Find an h2::Reason somewhere in the cause stack, if it exists,
        // otherwise assume an INTERNAL_ERROR.
        let mut cause = self.source();
        while let Some(err) = cause {
            if let Some(h2_err) = err.downcast_ref::<h2::Error>() {
                return h2_err.reason().unwrap_or(h2::Reason::INTERNAL_ERROR);
            }
            cause = err.source();
        }

        // else
        h2::Reason::INTERNAL_ERROR
    }

    #[cfg(feature = "server")]
    pub(crate) fn new_canceled() -> Error {
        Error::new(Kind::Canceled)
    }

    pub(crate) fn new_incomplete() -> Error {
        Error::new(Kind::Incomplete)
    }

    pub(crate) fn new_too_large() -> Error {
        Error::new(Kind::Parse(Parse::TooLarge))
    }

    #[cfg(feature = "server")]
    pub(crate) fn new_closed() -> Error {
        Error::new(Kind::ChannelClosed)
    }

    pub(crate) fn new_io(cause: std::io::Error) -> Error {
        Error::new(Kind::Io).with(cause)
    }

    #[cfg(feature = "client")]
    pub(crate) fn new_connect<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Connect).with(cause)
    }

    #[cfg(feature = "server")]
    pub(crate) fn new_accept<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Accept).with(cause)
    }

    pub(crate) fn new_body<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Body).with(cause)
    }

    pub(crate) fn new_body_too_large() -> Error {
        Error::new(Kind::BodyTooLarge)
    }

    pub(crate) fn new_body_write<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::BodyWrite).with(cause)
    }

    #[cfg(feature = "server")]
    pub(crate) fn new_user_service<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::User(User::Service)).with(cause)
    }

    #[cfg(feature = "server")]
    pub(crate) fn new_user_no_hijack() -> Error {
        Error::new(Kind::User(User::NoHijack))
    }

    #[cfg(feature = "client")]
    pub(crate) fn new_user_absolute_uri_required() -> Error {
        Error::new(Kind::User(User::AbsoluteUriRequired))
    }

    #[cfg(feature = "client")]
    pub(crate) fn new_user_unsupported_scheme() -> Error {
        Error::new(Kind::User(User::UnsupportedScheme))
    }

    pub(crate) fn new_h2(cause: h2::Error) -> Error {
        if cause.is_io() {
            Error::new_io(cause.into_io().expect("h2::Error::is_io"))
        } else {
            Error::new(Kind::Http2).with(cause)
        }
    }

    /// The error's standalone message, without the message from the source.
    pub fn message(&self) -> impl fmt::Display + '_ {
        self.description()
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Parse(Parse::Method) => "invalid HTTP method parsed",
            Kind::Parse(Parse::Version) => "invalid HTTP version parsed",
            Kind::Parse(Parse::Uri) => "invalid URI",
            Kind::Parse(Parse::Header) => "invalid HTTP header parsed",
            Kind::Parse(Parse::TooLarge) => "message head is too large",
            Kind::Parse(Parse::Status) => "invalid HTTP status-code parsed",
            Kind::Incomplete => "connection closed before message completed",
            Kind::Canceled => "operation was canceled",
            Kind::ChannelClosed => "channel closed",
            Kind::Io => "connection error",
            Kind::Connect => "error trying to connect",
            Kind::Accept => "error accepting connection",
            Kind::Body => "error reading a body from connection",
            Kind::BodyTooLarge => "message body is too large",
            Kind::BodyWrite => "error writing a body to connection",
            Kind::Http2 => "http2 error",
            Kind::User(User::Service) => "error from user's Service",
            Kind::User(User::NoHijack) => "connection does not support hijacking",
            Kind::User(User::AbsoluteUriRequired) => "client requires absolute-form URIs",
            Kind::User(User::UnsupportedScheme) => "transport does not support this URI scheme",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("h2c::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

#[doc(hidden)]
impl From<Parse> for Error {
    fn from(err: Parse) -> Error {
        Error::new(Kind::Parse(err))
    }
}

impl From<httparse::Error> for Parse {
    fn from(err: httparse::Error) -> Parse {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => Parse::Header,
            httparse::Error::Status => Parse::Status,
            httparse::Error::TooManyHeaders => Parse::TooLarge,
            httparse::Error::Version => Parse::Version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn error_size_of() {
        assert_eq!(mem::size_of::<Error>(), mem::size_of::<usize>());
    }

    #[cfg(feature = "server")]
    #[test]
    fn h2_reason_unknown() {
        let closed = Error::new_closed();
        assert_eq!(closed.h2_reason(), h2::Reason::INTERNAL_ERROR);
    }

    #[cfg(feature = "server")]
    #[test]
    fn h2_reason_one_level() {
        let body_err = Error::new_user_service(h2::Error::from(h2::Reason::ENHANCE_YOUR_CALM));
        assert_eq!(body_err.h2_reason(), h2::Reason::ENHANCE_YOUR_CALM);
    }

    #[cfg(feature = "server")]
    #[test]
    fn h2_reason_nested() {
        let recvd = Error::new_h2(h2::Error::from(h2::Reason::HTTP_1_1_REQUIRED));
        // Suppose a user were proxying the received error
        let svc_err = Error::new_user_service(recvd);
        assert_eq!(svc_err.h2_reason(), h2::Reason::HTTP_1_1_REQUIRED);
    }

    #[test]
    fn display_includes_cause() {
        let err = Error::new_io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "connection error: boom");
        assert!(err.source().is_some());
    }
}
