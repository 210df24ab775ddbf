//! HTTP/1 servers that can hand connections over to HTTP/2.
//!
//! A [`Server`] owns a handler (any [`HttpService`]) and runs an HTTP/1.1
//! loop on every connection it is given. Each request it reads carries a
//! [`Hijacker`](crate::hijack::Hijacker), which is how
//! [`ClearText`] takes prior-knowledge HTTP/2 connections out of the loop.
//!
//! To accept h2c on an existing server, wrap its handler with
//! [`attach_clear_text_handler`]:
//!
//! ```no_run
//! # async fn run() {
//! use std::convert::Infallible;
//!
//! use h2c::server::{attach_clear_text_handler, Http2, Server};
//! use h2c::service::service_fn;
//! use h2c::{Body, Request, Response};
//!
//! let server = Server::builder()
//!     .http1_keep_alive(true)
//!     .serve(service_fn(|req: Request<Body>| async move {
//!         Ok::<_, Infallible>(Response::new(Body::from(format!("{:?}", req.version()))))
//!     }));
//!
//! let mut h2 = Http2::new();
//! h2.max_concurrent_streams(250);
//! let server = attach_clear_text_handler(Some(h2), server);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//! server.serve(listener).await;
//! # }
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::common::exec::{BoxSendFuture, Exec, Executor};
use crate::proto::h1::{DEFAULT_MAX_BUFFER_SIZE, MINIMUM_MAX_BUFFER_SIZE};
use crate::service::HttpService;

mod conn;
mod h2c;
mod http2;

pub use self::h2c::{attach_clear_text_handler, ClearText};
pub use self::http2::Http2;

/// An HTTP/1 server: a handler plus the configuration it runs with.
pub struct Server<S> {
    handler: S,
    config: Config,
}

/// A builder for a [`Server`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    config: Config,
}

/// The settings of a [`Server`].
///
/// The cleartext handler hands these to the HTTP/2 engine as its base
/// configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) keep_alive: bool,
    pub(crate) max_buf_size: usize,
    pub(crate) max_body_size: Option<usize>,
    pub(crate) exec: Exec,
}

// ===== impl Config =====

impl Config {
    /// Whether HTTP/1 connections are kept alive between requests.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The largest message head the server buffers.
    pub fn max_buf_size(&self) -> usize {
        self.max_buf_size
    }

    /// The largest request body the server accepts, if any.
    pub fn max_body_size(&self) -> Option<usize> {
        self.max_body_size
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            keep_alive: true,
            max_buf_size: DEFAULT_MAX_BUFFER_SIZE,
            max_body_size: None,
            exec: Exec::Default,
        }
    }
}

// ===== impl Builder =====

impl Builder {
    /// Sets whether HTTP/1 keep-alive is enabled.
    ///
    /// Default is `true`.
    pub fn http1_keep_alive(&mut self, val: bool) -> &mut Self {
        self.config.keep_alive = val;
        self
    }

    /// Set the maximum buffer size for the connection.
    ///
    /// Default is ~400kb.
    ///
    /// # Panics
    ///
    /// The minimum value allowed is 8192. This method panics if the passed `max` is less than the minimum.
    pub fn max_buf_size(&mut self, max: usize) -> &mut Self {
        assert!(
            max >= MINIMUM_MAX_BUFFER_SIZE,
            "the max_buf_size cannot be smaller than the minimum that h1 specifies."
        );
        self.config.max_buf_size = max;
        self
    }

    /// Sets the largest request body accepted, over HTTP/1 and HTTP/2.
    ///
    /// Request bodies are read whole before the handler runs. A longer one
    /// is answered with `413 Payload Too Large`; over HTTP/1 the connection
    /// is then closed.
    ///
    /// Default is no limit.
    pub fn max_body_size(&mut self, max: usize) -> &mut Self {
        self.config.max_body_size = Some(max);
        self
    }

    /// Set the executor used to spawn background tasks.
    ///
    /// Default uses implicit default (like `tokio::spawn`).
    pub fn executor<E>(&mut self, exec: E) -> &mut Self
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        self.config.exec = Exec::new(exec);
        self
    }

    /// Builds a [`Server`] running `handler` with this configuration.
    pub fn serve<S>(&self, handler: S) -> Server<S> {
        Server {
            handler,
            config: self.config.clone(),
        }
    }
}

// ===== impl Server =====

impl Server<()> {
    /// Starts a [`Builder`] with the default configuration.
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl<S> Server<S> {
    /// Creates a server with the default configuration.
    pub fn new(handler: S) -> Server<S> {
        Builder::default().serve(handler)
    }

    /// The handler requests are currently routed to.
    pub fn handler(&self) -> &S {
        &self.handler
    }

    /// The server's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the handler with one built from the current handler and the
    /// server's configuration.
    pub fn map_handler<F, S2>(self, f: F) -> Server<S2>
    where
        F: FnOnce(S, &Config) -> S2,
    {
        let handler = f(self.handler, &self.config);
        Server {
            handler,
            config: self.config,
        }
    }
}

impl<S> Server<S>
where
    S: HttpService,
{
    /// Serves HTTP/1 on one connection, until either side closes it or the
    /// handler hijacks it.
    pub fn serve_connection<I>(
        &self,
        io: I,
    ) -> impl std::future::Future<Output = crate::Result<()>> + Send + 'static
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = conn::serve_connection(io, self.handler.clone(), self.config.clone());
        async move {
            let dispatched = conn.await?;
            trace!("connection done: {:?}", dispatched);
            Ok(())
        }
    }

    /// Accepts connections from `listener` forever, serving each one on its
    /// own task.
    ///
    /// Errors on a single connection are logged and do not affect others.
    /// If accepting fails for a reason other than the connection at hand
    /// (for instance the process ran out of file descriptors), the error is
    /// logged and accepting resumes after one second.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    trace!("accepted connection from {}", remote_addr);
                    let conn = self.serve_connection(stream);
                    self.config.exec.execute(async move {
                        if let Err(e) = conn.await {
                            debug!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    // Connection errors can be ignored directly, continue by
                    // accepting the next request.
                    if is_connection_error(&e) {
                        debug!("accepted connection already errored: {}", e);
                        continue;
                    }
                    let err = crate::Error::new_accept(e);
                    error!("accept error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// This function defines errors that are per-connection. Which basically
/// means that if we get this error from `accept()` system call it means
/// next connection might be ready to be accepted.
///
/// All other errors will incur a timeout before next `accept()` is performed.
/// The timeout is useful to handle resource exhaustion errors like ENFILE
/// and EMFILE. Otherwise, could enter into tight loop.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

impl<S: fmt::Debug> fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("handler", &self.handler)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let server = Server::new(());
        assert!(server.config().keep_alive());
        assert_eq!(server.config().max_buf_size(), DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(server.config().max_body_size(), None);
    }

    #[test]
    fn map_handler_sees_config() {
        let server = Server::builder()
            .http1_keep_alive(false)
            .max_buf_size(16 * 1024)
            .max_body_size(1024)
            .serve(1u8);
        let server = server.map_handler(|old, config| (old, config.max_buf_size()));
        assert_eq!(*server.handler(), (1u8, 16 * 1024));
        assert!(!server.config().keep_alive());
        assert_eq!(server.config().max_body_size(), Some(1024));
    }

    #[test]
    #[should_panic]
    fn max_buf_size_minimum() {
        Server::builder().max_buf_size(MINIMUM_MAX_BUFFER_SIZE - 1);
    }

    #[test]
    fn connection_errors() {
        assert!(is_connection_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(!is_connection_error(&io::Error::from(io::ErrorKind::Other)));
    }
}
