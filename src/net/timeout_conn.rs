//! Deadline-enforcing connection wrapper.
//!
//! # Responsibilities
//! - Arm a read deadline (now + timeout) when a read starts
//! - Arm a write deadline (now + timeout) when a write or flush starts
//! - Fail the pending operation with `io::ErrorKind::TimedOut` once its deadline elapses
//! - Disarm the deadline as soon as the operation completes
//! - Restart a pending read deadline once a write completes
//!
//! # Design Decisions
//! - Deadlines are per operation, not per connection: a pooled connection
//!   never carries an elapsed deadline into the next request
//! - A read left pending while a connection idles in the pool is waiting for
//!   the *next* response, so its clock starts when the next request goes out
//! - No retries; the caller decides what to do with a timeout
//! - A zero timeout disables the deadline entirely

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper_util::client::legacy::connect::{Connected, Connection};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

/// Direction of an I/O operation guarded by a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Write => write!(f, "write"),
        }
    }
}

/// A lazily created, resettable timer for one direction of a connection.
#[derive(Debug, Default)]
struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
    armed: bool,
}

impl Deadline {
    /// Pass a completed poll through, or check the deadline for a pending one.
    fn guard<R>(
        &mut self,
        cx: &mut Context<'_>,
        timeout: Duration,
        op: Operation,
        poll: Poll<io::Result<R>>,
    ) -> Poll<io::Result<R>> {
        match poll {
            Poll::Ready(result) => {
                self.armed = false;
                Poll::Ready(result)
            }
            Poll::Pending => self.poll_elapsed(cx, timeout, op).map(Err),
        }
    }

    /// Move an armed deadline to now + `timeout`.
    fn restart(&mut self, timeout: Duration) {
        if !self.armed || timeout.is_zero() {
            return;
        }
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.as_mut().reset(Instant::now() + timeout);
        }
    }

    fn poll_elapsed(
        &mut self,
        cx: &mut Context<'_>,
        timeout: Duration,
        op: Operation,
    ) -> Poll<io::Error> {
        if timeout.is_zero() {
            return Poll::Pending;
        }

        if !self.armed {
            let deadline = Instant::now() + timeout;
            match self.sleep.as_mut() {
                Some(sleep) => sleep.as_mut().reset(deadline),
                None => self.sleep = Some(Box::pin(sleep_until(deadline))),
            }
            self.armed = true;
        }

        let Some(sleep) = self.sleep.as_mut() else {
            return Poll::Pending;
        };

        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.armed = false;
                tracing::debug!(operation = %op, timeout = ?timeout, "Connection deadline elapsed");
                Poll::Ready(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{op} timed out after {timeout:?}"),
                ))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A connection whose every read and write must finish within `timeout`.
///
/// Implements both tokio's `AsyncRead`/`AsyncWrite` and hyper's `rt::Read`/`rt::Write`,
/// so it can wrap a raw tokio stream or the `TokioIo` adapter a hyper connector hands out.
#[derive(Debug)]
pub struct TimeoutConnection<T> {
    inner: T,
    timeout: Duration,
    read_deadline: Deadline,
    write_deadline: Deadline,
}

impl<T> TimeoutConnection<T> {
    /// Wrap `inner`, bounding each operation by `timeout`.
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            read_deadline: Deadline::default(),
            write_deadline: Deadline::default(),
        }
    }

    /// The per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn guard_write(
        &mut self,
        cx: &mut Context<'_>,
        poll: Poll<io::Result<usize>>,
    ) -> Poll<io::Result<usize>> {
        let poll = self
            .write_deadline
            .guard(cx, self.timeout, Operation::Write, poll);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.read_deadline.restart(self.timeout);
        }
        poll
    }
}

impl<T> AsyncRead for TimeoutConnection<T>
where
    T: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = AsyncRead::poll_read(Pin::new(&mut this.inner), cx, buf);
        this.read_deadline.guard(cx, this.timeout, Operation::Read, poll)
    }
}

impl<T> AsyncWrite for TimeoutConnection<T>
where
    T: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = AsyncWrite::poll_write(Pin::new(&mut this.inner), cx, buf);
        this.guard_write(cx, poll)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = AsyncWrite::poll_flush(Pin::new(&mut this.inner), cx);
        this.write_deadline.guard(cx, this.timeout, Operation::Write, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.get_mut().inner), cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = AsyncWrite::poll_write_vectored(Pin::new(&mut this.inner), cx, bufs);
        this.guard_write(cx, poll)
    }

    fn is_write_vectored(&self) -> bool {
        AsyncWrite::is_write_vectored(&self.inner)
    }
}

impl<T> hyper::rt::Read for TimeoutConnection<T>
where
    T: hyper::rt::Read + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = hyper::rt::Read::poll_read(Pin::new(&mut this.inner), cx, buf);
        this.read_deadline.guard(cx, this.timeout, Operation::Read, poll)
    }
}

impl<T> hyper::rt::Write for TimeoutConnection<T>
where
    T: hyper::rt::Write + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = hyper::rt::Write::poll_write(Pin::new(&mut this.inner), cx, buf);
        this.guard_write(cx, poll)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = hyper::rt::Write::poll_flush(Pin::new(&mut this.inner), cx);
        this.write_deadline.guard(cx, this.timeout, Operation::Write, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.get_mut().inner), cx)
    }

    fn is_write_vectored(&self) -> bool {
        hyper::rt::Write::is_write_vectored(&self.inner)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = hyper::rt::Write::poll_write_vectored(Pin::new(&mut this.inner), cx, bufs);
        this.guard_write(cx, poll)
    }
}

impl<T> Connection for TimeoutConnection<T>
where
    T: Connection,
{
    fn connected(&self) -> Connected {
        self.inner.connected()
    }
}
