use std::convert::TryFrom;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Config;
use crate::common::exec::{BoxSendFuture, Exec, Executor};
use crate::proto;
use crate::service::HttpService;

/// Configuration of the HTTP/2 engine that serves hijacked connections.
///
/// Options left unset use `h2`'s defaults, except the header list limit,
/// which follows the base [`Config`]'s maximum buffer size.
#[derive(Clone, Debug, Default)]
pub struct Http2 {
    initial_stream_window_size: Option<u32>,
    initial_conn_window_size: Option<u32>,
    max_concurrent_streams: Option<u32>,
    max_frame_size: Option<u32>,
    max_header_list_size: Option<u32>,
    exec: Option<Exec>,
}

impl Http2 {
    /// Creates an engine configuration with default options.
    pub fn new() -> Http2 {
        Http2::default()
    }

    /// Sets the [`SETTINGS_INITIAL_WINDOW_SIZE`][spec] option for HTTP2
    /// stream-level flow control.
    ///
    /// Passing `None` will do nothing.
    ///
    /// If not set, `h2`'s default is used.
    ///
    /// [spec]: https://http2.github.io/http2-spec/#SETTINGS_INITIAL_WINDOW_SIZE
    pub fn initial_stream_window_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.initial_stream_window_size = Some(sz);
        }
        self
    }

    /// Sets the max connection-level flow control for HTTP2.
    ///
    /// Passing `None` will do nothing.
    pub fn initial_connection_window_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.initial_conn_window_size = Some(sz);
        }
        self
    }

    /// Sets the [`SETTINGS_MAX_CONCURRENT_STREAMS`][spec] option for HTTP2
    /// connections.
    ///
    /// Default is no limit (`std::u32::MAX`). Passing `None` will do nothing.
    ///
    /// [spec]: https://http2.github.io/http2-spec/#SETTINGS_MAX_CONCURRENT_STREAMS
    pub fn max_concurrent_streams(&mut self, max: impl Into<Option<u32>>) -> &mut Self {
        if let Some(max) = max.into() {
            self.max_concurrent_streams = Some(max);
        }
        self
    }

    /// Sets the maximum frame size to use for HTTP2.
    ///
    /// Passing `None` will do nothing.
    pub fn max_frame_size(&mut self, sz: impl Into<Option<u32>>) -> &mut Self {
        if let Some(sz) = sz.into() {
            self.max_frame_size = Some(sz);
        }
        self
    }

    /// Sets the max size of received header frames.
    ///
    /// Default is the base configuration's `max_buf_size`.
    pub fn max_header_list_size(&mut self, max: u32) -> &mut Self {
        self.max_header_list_size = Some(max);
        self
    }

    /// Set the executor used to spawn a task per HTTP/2 stream.
    ///
    /// Default is the base configuration's executor.
    pub fn executor<E>(&mut self, exec: E) -> &mut Self
    where
        E: Executor<BoxSendFuture> + Send + Sync + 'static,
    {
        self.exec = Some(Exec::new(exec));
        self
    }

    /// Serves HTTP/2 on `io`, dispatching every stream to `service`.
    ///
    /// `io` must be positioned at the very start of the client connection
    /// preface. Resolves once the peer closes the connection.
    pub async fn serve_connection<I, S>(
        &self,
        io: I,
        service: S,
        config: &Config,
    ) -> crate::Result<()>
    where
        I: AsyncRead + AsyncWrite + Unpin,
        S: HttpService,
    {
        let builder = self.h2_builder(config);
        let exec = self.exec.as_ref().unwrap_or(&config.exec);
        proto::h2::server::serve(io, &builder, service, exec, config.max_body_size).await
    }

    fn h2_builder(&self, config: &Config) -> h2::server::Builder {
        let mut builder = h2::server::Builder::default();
        if let Some(sz) = self.initial_stream_window_size {
            builder.initial_window_size(sz);
        }
        if let Some(sz) = self.initial_conn_window_size {
            builder.initial_connection_window_size(sz);
        }
        if let Some(max) = self.max_concurrent_streams {
            builder.max_concurrent_streams(max);
        }
        if let Some(sz) = self.max_frame_size {
            builder.max_frame_size(sz);
        }
        let max_header_list_size = self
            .max_header_list_size
            .unwrap_or_else(|| u32::try_from(config.max_buf_size).unwrap_or(u32::MAX));
        builder.max_header_list_size(max_header_list_size);
        builder
    }
}
