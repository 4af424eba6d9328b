//! The transport capability handed to
//! [`Broadcaster::subscribe`](crate::broadcaster::Broadcaster::subscribe).

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A sink that accepts encoded event frames and can fail.
///
/// The broadcaster stays decoupled from any particular transport: an HTTP
/// streaming response, a WebSocket, or a test double all subscribe through
/// this trait. A failed or timed-out `send` marks the subscriber dead and
/// gets it evicted.
#[async_trait]
pub trait EventSink: Send + 'static {
    /// Deliver one encoded frame.
    async fn send(&mut self, frame: Bytes) -> io::Result<()>;

    /// Best-effort close of the underlying transport. Errors are swallowed.
    async fn close(&mut self);
}

/// [`EventSink`] over any async byte stream (an HTTP response half, one end
/// of a duplex pipe).
pub struct StreamSink<W> {
    writer: W,
}

impl<W> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> EventSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
