use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::{cmp, io};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::proto::h2::{PREFACE, PRI_LINE_LEN};

/// A hijacked connection that replays what the HTTP/1 parser already took.
///
/// Reads yield, in order, the part of the HTTP/2 preface that was parsed as
/// the `PRI * HTTP/2.0` request head, then whatever input was sitting in the
/// HTTP/1 read buffer, and only then bytes from the raw connection. Writes
/// go straight to the raw connection.
pub(crate) struct ForwardConn<T> {
    replay: Mutex<Replay>,
    inner: T,
}

struct Replay {
    preface: Bytes,
    buffered: Bytes,
}

impl<T> ForwardConn<T> {
    /// Wraps a hijacked connection.
    ///
    /// # Panics
    ///
    /// Panics if `pending_write` is not empty: output the HTTP/1 side never
    /// flushed would be lost.
    pub(crate) fn new(io: T, read_buf: Bytes, pending_write: &[u8]) -> ForwardConn<T> {
        assert!(
            pending_write.is_empty(),
            "hijacked connection has {} bytes of unflushed output",
            pending_write.len(),
        );
        ForwardConn {
            replay: Mutex::new(Replay {
                preface: Bytes::from_static(&PREFACE[..PRI_LINE_LEN]),
                buffered: read_buf,
            }),
            inner: io,
        }
    }

    /// The number of bytes still to be replayed before reads reach the raw
    /// connection.
    pub(crate) fn replay_remaining(&self) -> usize {
        let replay = self.lock();
        replay.preface.len() + replay.buffered.len()
    }

    fn lock(&self) -> MutexGuard<'_, Replay> {
        // The guarded data is two buffers that are always left consistent.
        self.replay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> AsyncRead for ForwardConn<T>
where
    T: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        {
            let mut replay = self.lock();
            let Replay {
                ref mut preface,
                ref mut buffered,
            } = *replay;
            let pending = if !preface.is_empty() {
                Some(preface)
            } else if !buffered.is_empty() {
                Some(buffered)
            } else {
                None
            };
            if let Some(pending) = pending {
                let copy_len = cmp::min(pending.len(), buf.remaining());
                buf.put_slice(&pending[..copy_len]);
                pending.advance(copy_len);
                trace!("replayed {} bytes", copy_len);
                return Poll::Ready(Ok(()));
            }
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T> AsyncWrite for ForwardConn<T>
where
    T: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

impl<T> fmt::Debug for ForwardConn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardConn")
            .field("replay_remaining", &self.replay_remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn expected(buffered: &[u8], live: &[u8]) -> Vec<u8> {
        let mut v = PREFACE[..PRI_LINE_LEN].to_vec();
        v.extend_from_slice(buffered);
        v.extend_from_slice(live);
        v
    }

    #[tokio::test]
    async fn replays_preface_then_buffer_then_live() {
        let buffered = b"SM\r\n\r\n\x00\x00\x00\x04\x00\x00\x00\x00\x00";
        let live = b"\x00\x00\x08\x06\x00\x00\x00\x00\x00pingpong";

        for &chunk in &[1usize, 5, 18, 64] {
            let mock = tokio_test::io::Builder::new().read(live).build();
            let mut conn = ForwardConn::new(mock, Bytes::from_static(buffered), &[]);
            assert_eq!(conn.replay_remaining(), PRI_LINE_LEN + buffered.len());

            let mut got = Vec::new();
            let mut scratch = vec![0u8; chunk];
            loop {
                let n = conn.read(&mut scratch).await.expect("read");
                if n == 0 {
                    break;
                }
                got.extend_from_slice(&scratch[..n]);
            }
            assert_eq!(got, expected(buffered, live), "chunk size {}", chunk);
            assert_eq!(conn.replay_remaining(), 0);
        }
    }

    #[tokio::test]
    async fn empty_buffer_goes_live_after_preface() {
        let mock = tokio_test::io::Builder::new().read(b"live").build();
        let mut conn = ForwardConn::new(mock, Bytes::new(), &[]);

        let mut got = Vec::new();
        conn.read_to_end(&mut got).await.expect("read_to_end");
        assert_eq!(got, expected(b"", b"live"));
    }

    #[test]
    #[should_panic(expected = "unflushed output")]
    fn pending_output_panics() {
        let mock = tokio_test::io::Builder::new().build();
        let _ = ForwardConn::new(mock, Bytes::new(), b"HTTP/1.1 200 OK\r\n");
    }

    #[tokio::test]
    async fn writes_pass_through() {
        let mock = tokio_test::io::Builder::new()
            .write(b"\x00\x00\x00\x04\x01\x00\x00\x00\x00")
            .build();
        let mut conn = ForwardConn::new(mock, Bytes::from_static(b"SM\r\n\r\n"), &[]);
        conn.write_all(b"\x00\x00\x00\x04\x01\x00\x00\x00\x00")
            .await
            .expect("write");
        conn.flush().await.expect("flush");
        // writing does not consume anything waiting to be replayed
        assert_eq!(conn.replay_remaining(), PRI_LINE_LEN + 6);

        let mut head = [0u8; PRI_LINE_LEN];
        conn.read_exact(&mut head).await.expect("read preface");
        assert_eq!(&head[..], &PREFACE[..PRI_LINE_LEN]);
        let mut sm = [0u8; 6];
        conn.read_exact(&mut sm).await.expect("read buffered");
        assert_eq!(&sm, b"SM\r\n\r\n");
    }
}
