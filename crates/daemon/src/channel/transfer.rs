//! File-transfer session for one channel.
//!
//! The SFTP protocol server runs on its own task and does not report how it
//! ended, so the channel stream is wrapped in a [`MonitoredStream`] that
//! records the first end-of-input or I/O failure. That outcome decides
//! whether the session ended cleanly or failed.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ServerError;
use crate::files::HostFolder;
use crate::lifecycle::{Lifecycle, SessionTicket};

/// How a channel stream ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The client closed its side of the channel.
    Clean,
    /// Reading or writing the channel failed.
    Failed(io::Error),
}

/// Stream adapter reporting the first end-of-input or I/O error.
///
/// After a failure the adapter reports end of input to its reader, so the
/// protocol server stops instead of retrying a broken channel.
pub struct MonitoredStream<S> {
    inner: S,
    outcome: Option<oneshot::Sender<StreamEnd>>,
    failed: bool,
}

impl<S> MonitoredStream<S> {
    /// Wraps `inner`, returning the adapter and a receiver for its outcome.
    ///
    /// If the adapter is dropped before the stream ends, the receiver
    /// observes a closed channel.
    pub fn new(inner: S) -> (Self, oneshot::Receiver<StreamEnd>) {
        let (tx, rx) = oneshot::channel();
        let stream = Self {
            inner,
            outcome: Some(tx),
            failed: false,
        };
        (stream, rx)
    }

    fn report(&mut self, end: StreamEnd) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(end);
        }
    }

    fn fail(&mut self, err: &io::Error) {
        self.failed = true;
        self.report(StreamEnd::Failed(io::Error::new(err.kind(), err.to_string())));
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for MonitoredStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.failed {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() == before && buf.remaining() > 0 {
                    self.report(StreamEnd::Clean);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                self.fail(&err);
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MonitoredStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Err(err)) = &result {
            self.fail(err);
        }
        result
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_flush(cx);
        if let Poll::Ready(Err(err)) = &result {
            self.fail(err);
        }
        result
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Serves SFTP over `stream` until it ends, then retires `ticket`.
///
/// A clean end of input only releases the channel's count. Any other end is
/// reported to the lifecycle as a transfer failure before the count is
/// released.
pub async fn run_transfer<S>(
    stream: S,
    backend: HostFolder,
    ticket: SessionTicket,
    lifecycle: Lifecycle,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (stream, ended) = MonitoredStream::new(stream);
    russh_sftp::server::run(stream, backend).await;

    let end = ended.await.unwrap_or_else(|_| {
        StreamEnd::Failed(io::Error::other("sftp server stopped before the channel ended"))
    });
    match end {
        StreamEnd::Clean => debug!("sftp channel reached end of input"),
        StreamEnd::Failed(err) => lifecycle.fail(ServerError::Transfer(err)),
    }

    lifecycle.retire(&ticket);
}
