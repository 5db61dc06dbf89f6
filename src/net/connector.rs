//! Dial step of the client transport.
//!
//! # Responsibilities
//! - Establish TCP connections with a bounded connect timeout
//! - Wrap every established stream in a [`TimeoutConnection`]
//! - Run the TLS handshake for `https` destinations on top of that wrapper
//!
//! # Design Decisions
//! - Built on hyper-util's `HttpConnector` (DNS, happy eyeballs, nodelay)
//! - Exposed as a `tower::Service<Uri>` so the legacy client can pool its output
//! - TLS sits above the deadline layer: handshake and record I/O share the
//!   read/write timeout of plain connections

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::http::{uri::Scheme, Uri};
use futures_util::future::BoxFuture;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tower::Service;

use crate::net::timeout_conn::TimeoutConnection;
use crate::net::tls;

/// Boxed error produced by the dial step.
pub type ConnectError = Box<dyn std::error::Error + Send + Sync>;

/// A dialed TCP stream under read/write deadlines.
pub type PlainStream = TimeoutConnection<TokioIo<TcpStream>>;

/// A TLS session whose transport is a [`PlainStream`].
pub type SecureStream = TokioIo<TlsStream<TokioIo<PlainStream>>>;

/// The connection type handed to the transport's pool.
pub enum TimeoutStream {
    Plain(PlainStream),
    Tls(SecureStream),
}

impl TimeoutStream {
    /// The deadline-enforcing layer, below TLS if any.
    pub fn deadline_layer(&self) -> &PlainStream {
        match self {
            TimeoutStream::Plain(stream) => stream,
            TimeoutStream::Tls(stream) => stream.inner().get_ref().0.inner(),
        }
    }

    /// The per-operation timeout of this connection.
    pub fn timeout(&self) -> Duration {
        self.deadline_layer().timeout()
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, TimeoutStream::Tls(_))
    }
}

impl Read for TimeoutStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TimeoutStream::Plain(stream) => Read::poll_read(Pin::new(stream), cx, buf),
            TimeoutStream::Tls(stream) => Read::poll_read(Pin::new(stream), cx, buf),
        }
    }
}

impl Write for TimeoutStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TimeoutStream::Plain(stream) => Write::poll_write(Pin::new(stream), cx, buf),
            TimeoutStream::Tls(stream) => Write::poll_write(Pin::new(stream), cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TimeoutStream::Plain(stream) => Write::poll_flush(Pin::new(stream), cx),
            TimeoutStream::Tls(stream) => Write::poll_flush(Pin::new(stream), cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TimeoutStream::Plain(stream) => Write::poll_shutdown(Pin::new(stream), cx),
            TimeoutStream::Tls(stream) => Write::poll_shutdown(Pin::new(stream), cx),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            TimeoutStream::Plain(stream) => Write::is_write_vectored(stream),
            TimeoutStream::Tls(stream) => Write::is_write_vectored(stream),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TimeoutStream::Plain(stream) => Write::poll_write_vectored(Pin::new(stream), cx, bufs),
            TimeoutStream::Tls(stream) => Write::poll_write_vectored(Pin::new(stream), cx, bufs),
        }
    }
}

impl Connection for TimeoutStream {
    fn connected(&self) -> Connected {
        self.deadline_layer().connected()
    }
}

/// Connector enforcing a dial timeout and a per-operation read/write timeout.
#[derive(Clone)]
pub struct TimeoutConnector {
    http: HttpConnector,
    tls: Arc<ClientConfig>,
    dial_timeout: Duration,
    rw_timeout: Duration,
}

impl std::fmt::Debug for TimeoutConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutConnector")
            .field("dial_timeout", &self.dial_timeout)
            .field("rw_timeout", &self.rw_timeout)
            .finish_non_exhaustive()
    }
}

impl TimeoutConnector {
    /// Create a connector trusting the bundled web PKI roots.
    /// A zero duration disables the corresponding timeout.
    pub fn new(dial_timeout: Duration, rw_timeout: Duration) -> Self {
        Self::with_tls_config(dial_timeout, rw_timeout, tls::default_client_config())
    }

    /// Create a connector using `tls` for `https` destinations.
    pub fn with_tls_config(
        dial_timeout: Duration,
        rw_timeout: Duration,
        tls: Arc<ClientConfig>,
    ) -> Self {
        let mut http = HttpConnector::new();
        http.set_connect_timeout((!dial_timeout.is_zero()).then_some(dial_timeout));
        http.set_nodelay(true);
        http.enforce_http(false);

        Self {
            http,
            tls,
            dial_timeout,
            rw_timeout,
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    pub fn rw_timeout(&self) -> Duration {
        self.rw_timeout
    }
}

impl Service<Uri> for TimeoutConnector {
    type Response = TimeoutStream;
    type Error = ConnectError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let connecting = self.http.call(dst.clone());
        let rw_timeout = self.rw_timeout;
        let tls = (dst.scheme() == Some(&Scheme::HTTPS))
            .then(|| TlsConnector::from(self.tls.clone()));

        Box::pin(async move {
            let stream = connecting.await.map_err(|e| {
                tracing::debug!(destination = %dst, error = %e, "Dial failed");
                ConnectError::from(e)
            })?;
            let stream = TimeoutConnection::new(stream, rw_timeout);

            let Some(tls) = tls else {
                tracing::trace!(
                    destination = %dst,
                    rw_timeout = ?rw_timeout,
                    "Connection established"
                );
                return Ok::<_, ConnectError>(TimeoutStream::Plain(stream));
            };

            let server_name = tls::server_name(dst.host().unwrap_or_default())?;
            let stream = tls
                .connect(server_name, TokioIo::new(stream))
                .await
                .map_err(|e| {
                    tracing::debug!(destination = %dst, error = %e, "TLS handshake failed");
                    ConnectError::from(e)
                })?;

            tracing::trace!(
                destination = %dst,
                rw_timeout = ?rw_timeout,
                "TLS connection established"
            );

            Ok::<_, ConnectError>(TimeoutStream::Tls(TokioIo::new(stream)))
        })
    }
}
