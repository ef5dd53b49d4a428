use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::callbacks::Callbacks;
use crate::direction::{ConnectionId, Direction};
use crate::error::ConnectionError;

/// Capacity of each forwarder's chunk buffer
pub const BUFFER_SIZE: usize = 24 * 8192;

/// Why the relay loop stopped
enum Exit {
    Failed(ConnectionError),
    Cancelled,
}

/// Copies one direction of a connection, offering every chunk to the
/// receive hook on the way through.
pub(crate) struct Forwarder {
    id: ConnectionId,
    direction: Direction,
    callbacks: Arc<dyn Callbacks>,
    scope: CancellationToken,
}

impl Forwarder {
    pub(crate) fn new(
        id: ConnectionId,
        direction: Direction,
        callbacks: Arc<dyn Callbacks>,
        scope: CancellationToken,
    ) -> Self {
        Self {
            id,
            direction,
            callbacks,
            scope,
        }
    }

    /// Relay from `source` to `sink` until either side fails or the
    /// connection scope is cancelled. Always cancels the scope on the way out
    /// and hands both halves back so the caller decides when they close.
    pub(crate) async fn run<R, W>(self, mut source: R, mut sink: W) -> (R, W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // Cancels the scope even if a hook panics and this task unwinds
        let _cancel_on_exit = self.scope.clone().drop_guard();
        let mut buf = BytesMut::with_capacity(BUFFER_SIZE);

        match self.pump(&mut source, &mut sink, &mut buf).await {
            Exit::Failed(err) => {
                tracing::debug!("Connection {} {} stopping: {}", self.id, self.direction, err);
                self.callbacks.on_error(self.id, self.direction, &err);
            }
            Exit::Cancelled => {
                tracing::debug!("Connection {} {} cancelled", self.id, self.direction);
            }
        }

        self.scope.cancel();
        self.callbacks.on_close(self.id, self.direction);

        (source, sink)
    }

    async fn pump<R, W>(&self, source: &mut R, sink: &mut W, buf: &mut BytesMut) -> Exit
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            // The receive hook may have grown or swapped the buffer
            if buf.capacity() > BUFFER_SIZE {
                *buf = BytesMut::with_capacity(BUFFER_SIZE);
            } else {
                buf.clear();
                buf.reserve(BUFFER_SIZE);
            }

            let mut chunk = (&mut *buf).limit(BUFFER_SIZE);
            let read = tokio::select! {
                biased;
                _ = self.scope.cancelled() => return Exit::Cancelled,
                read = source.read_buf(&mut chunk) => read,
            };

            match read {
                Ok(0) => return Exit::Failed(ConnectionError::PeerClosed),
                Ok(n) => tracing::trace!("Connection {} {} read {} bytes", self.id, self.direction, n),
                Err(e) => return Exit::Failed(ConnectionError::Read(e)),
            }

            if !self.callbacks.on_receive(self.id, self.direction, buf) {
                tracing::trace!("Connection {} {} dropped chunk", self.id, self.direction);
                continue;
            }

            let written = tokio::select! {
                biased;
                _ = self.scope.cancelled() => return Exit::Cancelled,
                written = sink.write_all(&buf[..]) => written,
            };

            if let Err(e) = written {
                return Exit::Failed(ConnectionError::Write(e));
            }
        }
    }
}
