//! Taking a connection away from the HTTP/1 server.
//!
//! Every request read by the HTTP/1 [`Server`](crate::Server) carries a
//! [`Hijacker`] in its extensions. A handler that wants to speak a different
//! protocol on the connection can [`take`] it and call
//! [`Hijacker::hijack`]. The server then stops processing the connection,
//! and hands over the raw IO together with whatever it had read but not yet
//! parsed, and whatever it had buffered but not yet written.
//!
//! After a successful hijack the server never writes the handler's
//! response. The handler owns the connection, and closing it is the
//! handler's job (dropping the IO closes it).

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

/// The capability to take over the connection a request arrived on.
pub struct Hijacker {
    tx: oneshot::Sender<oneshot::Sender<crate::Result<Hijacked>>>,
}

/// A connection taken over from the HTTP/1 server.
#[non_exhaustive]
pub struct Hijacked {
    /// The raw connection.
    pub io: Box<dyn Io + Send>,
    /// Bytes read from `io` that the HTTP/1 parser did not consume.
    pub read_buf: Bytes,
    /// Bytes the HTTP/1 server buffered for writing but never flushed.
    ///
    /// The server flushes before every read, so this is normally empty.
    pub write_buf: Bytes,
}

/// The connection types a [`Hijacked`] may hold.
pub trait Io: AsyncRead + AsyncWrite + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + 'static> Io for T {}

pub(crate) struct Pending {
    pub(crate) rx: oneshot::Receiver<oneshot::Sender<crate::Result<Hijacked>>>,
}

pub(crate) fn pending() -> (Hijacker, Pending) {
    let (tx, rx) = oneshot::channel();
    (Hijacker { tx }, Pending { rx })
}

/// Removes the [`Hijacker`] from a request, if it has one.
///
/// Only requests read by the HTTP/1 server carry one; requests arriving
/// over HTTP/2 never do.
pub fn take<B>(req: &mut http::Request<B>) -> Option<Hijacker> {
    req.extensions_mut().remove::<Hijacker>()
}

// ===== impl Hijacker =====

impl Hijacker {
    /// Takes over the connection.
    ///
    /// Fails if the connection already stopped being served, for instance
    /// because the peer went away.
    pub async fn hijack(self) -> crate::Result<Hijacked> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(tx).map_err(|_| crate::Error::new_closed())?;
        match rx.await {
            Ok(res) => res,
            Err(_canceled) => Err(crate::Error::new_canceled()),
        }
    }
}

impl fmt::Debug for Hijacker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hijacker").finish()
    }
}

// ===== impl Hijacked =====

impl fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hijacked")
            .field("read_buf", &self.read_buf.len())
            .field("write_buf", &self.write_buf.len())
            .finish()
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;

    #[tokio::test]
    async fn hijack_receives_connection() {
        let (hijacker, pending) = pending();
        let conn = tokio::spawn(async move {
            let reply = pending.rx.await.expect("hijack request");
            let io = tokio_test::io::Builder::new().build();
            let _ = reply.send(Ok(Hijacked {
                io: Box::new(io),
                read_buf: Bytes::from_static(b"leftover"),
                write_buf: Bytes::new(),
            }));
        });

        let hijacked = hijacker.hijack().await.expect("hijacked");
        assert_eq!(hijacked.read_buf, "leftover");
        assert!(hijacked.write_buf.is_empty());
        conn.await.expect("join");
    }

    #[tokio::test]
    async fn hijack_after_connection_gone() {
        let (hijacker, pending) = pending();
        drop(pending);
        let err = hijacker.hijack().await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn hijack_reply_dropped() {
        let (hijacker, pending) = pending();
        tokio::spawn(async move {
            let reply = pending.rx.await.expect("hijack request");
            drop(reply);
        });
        let err = hijacker.hijack().await.unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn take_from_extensions() {
        let (hijacker, _pending) = pending();
        let mut req = http::Request::new(Body::empty());
        assert!(take(&mut req).is_none());
        req.extensions_mut().insert(hijacker);
        assert!(take(&mut req).is_some());
        assert!(take(&mut req).is_none());
    }
}
