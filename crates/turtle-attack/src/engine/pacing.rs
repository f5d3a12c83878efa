//! Pacing primitives shared by the attacks.
//!
//! ## Write side
//! `WriteTimeout` wraps a socket so that every write gets its own deadline.
//! A write the peer does not accept in time fails with `TimedOut`, which the
//! attacks treat as the end of the attempt.
//!
//! ## Read side
//! `PacedReader` is a request body that trickles out one byte per jittered
//! tick, so the server sits waiting for the rest of the body.

use super::random::Randn;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Upper bound (exclusive, in ms) of the delay between two body bytes.
pub const BODY_BYTE_JITTER_MS: usize = 100;

/// The byte every paced body is made of.
pub const BODY_BYTE: u8 = b'a';

pin_project! {
    /// A wrapper around an AsyncWrite that re-arms a deadline on every write.
    ///
    /// The deadline starts when a write is first polled and is cleared once
    /// that write completes, so idle time between writes never counts.
    ///
    /// The timer is boxed so the wrapper is `Unpin` whenever `W` is.
    pub struct WriteTimeout<W> {
        #[pin]
        inner: W,
        deadline: Pin<Box<Sleep>>,
        write_timeout: Duration,
        armed: bool,
    }
}

impl<W> WriteTimeout<W> {
    pub fn new(inner: W, write_timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(sleep(write_timeout)),
            write_timeout,
            armed: false,
        }
    }

    /// Consumes the wrapper and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite> AsyncWrite for WriteTimeout<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if !*this.armed {
            this.deadline
                .as_mut()
                .reset(Instant::now() + *this.write_timeout);
            *this.armed = true;
        }

        match this.inner.poll_write(cx, buf) {
            Poll::Ready(res) => {
                *this.armed = false;
                Poll::Ready(res)
            }
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    *this.armed = false;
                    Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "write deadline exceeded",
                    )))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// A request body that makes one byte available per jittered tick.
///
/// A background task produces the ticks. It stops, ending the stream, when
/// the attempt is cancelled or `body_read_timeout` elapses. Dropping the
/// reader stops the producer too.
pub struct PacedReader {
    ticks: mpsc::Receiver<()>,
    _producer: DropGuard,
}

impl PacedReader {
    /// Starts the producer. A zero `body_read_timeout` means no timeout.
    pub fn start(cancel: &CancellationToken, body_read_timeout: Duration, randn: Randn) -> Self {
        let (tx, ticks) = mpsc::channel::<()>(1);
        let stop = cancel.child_token();

        let producer_stop = stop.clone();
        tokio::spawn(async move {
            let deadline =
                (!body_read_timeout.is_zero()).then(|| Instant::now() + body_read_timeout);
            let timed_out = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(timed_out);

            loop {
                let delay = Duration::from_millis(randn(BODY_BYTE_JITTER_MS) as u64);
                tokio::select! {
                    _ = producer_stop.cancelled() => return,
                    _ = &mut timed_out => return,
                    _ = sleep(delay) => {}
                }

                tokio::select! {
                    _ = producer_stop.cancelled() => return,
                    _ = &mut timed_out => return,
                    sent = tx.send(()) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Self {
            ticks,
            _producer: stop.drop_guard(),
        }
    }
}

impl AsyncRead for PacedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        match self.ticks.poll_recv(cx) {
            Poll::Ready(Some(())) => {
                buf.put_slice(&[BODY_BYTE]);
                Poll::Ready(Ok(()))
            }
            // Producer ended: timeout or cancellation. Nothing filled means EOF.
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}
