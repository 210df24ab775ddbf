//! Pieces pertaining to the HTTP message protocol.

pub(crate) mod h1;
pub(crate) mod h2;

cfg_server! {
    /// How an HTTP/1 connection loop ended.
    #[derive(Debug)]
    #[must_use]
    pub(crate) enum Dispatched {
        /// Dispatcher completely shutdown connection.
        Shutdown,
        /// The handler took the connection out of the loop.
        Hijacked,
    }
}
