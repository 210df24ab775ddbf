use std::cmp;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::future::poll_fn;
use futures_util::ready;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use super::ParseResult;

/// The initial buffer size allocated before trying to read from IO.
pub(crate) const INIT_BUFFER_SIZE: usize = 8192;

/// The minimum value that can be set to max buffer size.
#[cfg(feature = "server")]
pub(crate) const MINIMUM_MAX_BUFFER_SIZE: usize = INIT_BUFFER_SIZE;

/// The default maximum read buffer size. If the buffer gets this big and
/// a message is still not complete, a `TooLarge` error is triggered.
// Note: if this changes, update server::Builder::max_buf_size docs.
pub(crate) const DEFAULT_MAX_BUFFER_SIZE: usize = 8192 + 4096 * 100;

/// An IO object with a read buffer and a write buffer in front of it.
///
/// The read buffer may hold bytes that arrived from the network but that the
/// parser has not consumed yet. `into_inner` hands both buffers back along
/// with the IO, so nothing is lost when a connection changes owner.
pub(crate) struct Buffered<T> {
    io: T,
    max_buf_size: usize,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
}

impl<T> fmt::Debug for Buffered<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffered")
            .field("read_buf", &self.read_buf.len())
            .field("write_buf", &self.write_buf.len())
            .finish()
    }
}

impl<T> Buffered<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: T) -> Buffered<T> {
        Buffered {
            io,
            max_buf_size: DEFAULT_MAX_BUFFER_SIZE,
            read_buf: BytesMut::with_capacity(0),
            write_buf: Vec::new(),
        }
    }

    #[cfg(feature = "server")]
    pub(crate) fn set_max_buf_size(&mut self, max: usize) {
        assert!(
            max >= MINIMUM_MAX_BUFFER_SIZE,
            "The max_buf_size cannot be smaller than {}.",
            MINIMUM_MAX_BUFFER_SIZE,
        );
        self.max_buf_size = max;
    }

    pub(crate) fn read_buf(&self) -> &[u8] {
        self.read_buf.as_ref()
    }

    pub(crate) fn write_buf(&mut self) -> &mut Vec<u8> {
        &mut self.write_buf
    }

    /// Parses a message head with `parse`, reading more from the IO as needed.
    ///
    /// Returns `Ok(None)` if the IO reached EOF before any byte of a new
    /// message arrived.
    pub(crate) async fn parse<S, P>(&mut self, parse: P) -> crate::Result<Option<S>>
    where
        P: Fn(&mut BytesMut) -> ParseResult<S>,
    {
        loop {
            if let Some(msg) = parse(&mut self.read_buf)? {
                return Ok(Some(msg));
            }
            if self.read_buf.len() >= self.max_buf_size {
                debug!("max_buf_size ({}) reached, closing", self.max_buf_size);
                return Err(crate::Error::new_too_large());
            }
            let n = poll_fn(|cx| self.poll_read_from_io(cx))
                .await
                .map_err(crate::Error::new_io)?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    trace!("parse eof");
                    return Ok(None);
                }
                return Err(crate::Error::new_incomplete());
            }
        }
    }

    pub(crate) fn poll_read_from_io(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let filled = self.read_buf.len();
        self.read_buf.resize(filled + INIT_BUFFER_SIZE, 0);
        let mut buf = ReadBuf::new(&mut self.read_buf[filled..]);
        let res = Pin::new(&mut self.io).poll_read(cx, &mut buf);
        let n = buf.filled().len();
        self.read_buf.truncate(filled + n);
        match res {
            Poll::Ready(Ok(())) => {
                trace!("received {} bytes", n);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.io.write_all(&self.write_buf).await?;
            trace!("flushed {} bytes", self.write_buf.len());
            self.write_buf.clear();
        }
        self.io.flush().await
    }

    #[cfg(feature = "server")]
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }

    /// Gives up the IO, returning it with the unread input and the
    /// unflushed output.
    #[cfg(feature = "server")]
    pub(crate) fn into_inner(self) -> (T, Bytes, Bytes) {
        (self.io, self.read_buf.freeze(), Bytes::from(self.write_buf))
    }
}

/// A source of body bytes, read through a buffer.
pub(crate) trait MemRead {
    fn read_mem(&mut self, cx: &mut Context<'_>, len: usize) -> Poll<io::Result<Bytes>>;
}

impl<T> MemRead for Buffered<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn read_mem(&mut self, cx: &mut Context<'_>, len: usize) -> Poll<io::Result<Bytes>> {
        if !self.read_buf.is_empty() {
            let n = cmp::min(len, self.read_buf.len());
            Poll::Ready(Ok(self.read_buf.split_to(n).freeze()))
        } else {
            let n = ready!(self.poll_read_from_io(cx))?;
            Poll::Ready(Ok(self.read_buf.split_to(cmp::min(len, n)).freeze()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder as Mock;

    fn parse_line(buf: &mut BytesMut) -> ParseResult<Bytes> {
        match buf.iter().position(|&b| b == b'\n') {
            Some(idx) => Ok(Some(buf.split_to(idx + 1).freeze())),
            None => Ok(None),
        }
    }

    #[tokio::test]
    async fn parse_reads_until_complete() {
        let mock = Mock::new().read(b"hello ").read(b"world\nrest").build();
        let mut buffered = Buffered::new(mock);

        let line = buffered.parse(parse_line).await.expect("parse").expect("line");
        assert_eq!(line, "hello world\n");
        assert_eq!(buffered.read_buf(), b"rest");
    }

    #[cfg(feature = "server")]
    #[tokio::test]
    async fn into_inner_keeps_unread_input() {
        let mock = Mock::new().read(b"hello
rest").build();
        let mut buffered = Buffered::new(mock);
        buffered.parse(parse_line).await.expect("parse").expect("line");
        buffered.write_buf().extend_from_slice(b"pending");

        let (_io, read_buf, write_buf) = buffered.into_inner();
        assert_eq!(read_buf, "rest");
        assert_eq!(write_buf, "pending");
    }

    #[tokio::test]
    async fn parse_eof_between_messages() {
        let mock = Mock::new().build();
        let mut buffered = Buffered::new(mock);

        let res = buffered.parse(parse_line).await.expect("parse");
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn parse_eof_mid_message() {
        let mock = Mock::new().read(b"partial").build();
        let mut buffered = Buffered::new(mock);

        let err = buffered.parse(parse_line).await.unwrap_err();
        assert!(err.is_incomplete());
    }

    #[cfg(feature = "server")]
    #[tokio::test]
    async fn parse_too_large() {
        let big = vec![b'a'; MINIMUM_MAX_BUFFER_SIZE];
        let mock = Mock::new().read(&big).build();
        let mut buffered = Buffered::new(mock);
        buffered.set_max_buf_size(MINIMUM_MAX_BUFFER_SIZE);

        let err = buffered.parse(parse_line).await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn flush_writes_buffer() {
        let mock = Mock::new().write(b"GET / HTTP/1.1\r\n\r\n").build();
        let mut buffered = Buffered::new(mock);

        buffered
            .write_buf()
            .extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");
        buffered.flush().await.expect("flush");
        assert!(buffered.write_buf().is_empty());
    }
}
