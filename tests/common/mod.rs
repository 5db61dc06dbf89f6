//! Shared servers for integration tests.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower::Service;

use timeout_client::config::ObservabilityConfig;

/// How long `/slow` waits before answering.
#[allow(dead_code)]
pub const SLOW_RESPONSE_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
struct AppState {
    addr: SocketAddr,
    landing_hits: Arc<AtomicUsize>,
}

/// A running axum test server.
pub struct TestServer {
    pub addr: SocketAddr,
    landing_hits: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests that reached `/landing`.
    pub fn landing_hits(&self) -> usize {
        self.landing_hits.load(Ordering::SeqCst)
    }
}

/// Start a server on an ephemeral port.
///
/// Routes:
/// - `/echo`: JSON with method, uri, headers and body of the request
/// - `/found`: 302 to `/landing` with body `moved`
/// - `/landing`: counts hits, body `landed`
/// - `/redirect/{code}`: `{code}` to `/echo` with body `redirecting`
/// - `/absolute`: 302 to the absolute URL of `/echo`
/// - `/loop`: 302 to itself
/// - `/bare-redirect`: 302 without `Location`
/// - `/stalled-body`: 200 head and one chunk, then nothing
/// - `/missing`: 404 with body `nope`
/// - `/slow`: body `slow` after [`SLOW_RESPONSE_DELAY`]
pub async fn start_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let landing_hits = Arc::new(AtomicUsize::new(0));

    let app = router(AppState {
        addr,
        landing_hits: landing_hits.clone(),
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer { addr, landing_hits }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/found", any(found))
        .route("/landing", any(landing))
        .route("/redirect/{code}", any(redirect_with))
        .route("/absolute", any(absolute))
        .route("/loop", any(redirect_loop))
        .route("/bare-redirect", get(bare_redirect))
        .route("/stalled-body", get(stalled_body))
        .route("/missing", get(missing))
        .route("/slow", get(slow))
        .with_state(state)
}

/// A running TLS test server with a self-signed certificate for `localhost`.
#[allow(dead_code)]
pub struct TlsTestServer {
    pub addr: SocketAddr,
    pub certificate: CertificateDer<'static>,
}

#[allow(dead_code)]
impl TlsTestServer {
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr.port(), path)
    }
}

/// Start the routes of [`start_test_server`] behind TLS.
#[allow(dead_code)]
pub async fn start_tls_server() -> TlsTestServer {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let certificate = certified.cert.der().clone();
    let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![certificate.clone()], key.into())
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState {
        addr,
        landing_hits: Arc::new(AtomicUsize::new(0)),
    });

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let app = app.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(stream).await else {
                    return;
                };
                let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                    let mut app = app.clone();
                    async move { app.call(request).await }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    TlsTestServer { addr, certificate }
}

/// Start a backend that accepts connections and never reads or writes.
#[allow(dead_code)]
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// A listener whose accept queue is full, so new dials hang in the handshake.
///
/// Returns `None` when the platform keeps completing connections past the
/// backlog. The returned listener and streams must stay alive for the test.
#[allow(dead_code)]
pub async fn saturated_listener() -> Option<(TcpListener, Vec<TcpStream>)> {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut held = Vec::new();
    for _ in 0..64 {
        let dial = TcpStream::connect(addr);
        match tokio::time::timeout(Duration::from_millis(200), dial).await {
            Ok(Ok(stream)) => held.push(stream),
            Ok(Err(_)) => return None,
            Err(_) => return Some((listener, held)),
        }
    }
    None
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[allow(dead_code)]
pub fn init_logging() {
    timeout_client::observability::init_logging(&ObservabilityConfig {
        log_level: "debug".into(),
    });
}

/// Decode a `/echo` response body.
#[allow(dead_code)]
pub fn echoed(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("echo body is JSON")
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

fn redirect_to(status: StatusCode, location: &str, body: &'static str) -> Response {
    (status, [(header::LOCATION, location.to_string())], body).into_response()
}

async fn found() -> Response {
    redirect_to(StatusCode::FOUND, "/landing", "moved")
}

async fn landing(State(state): State<AppState>) -> &'static str {
    state.landing_hits.fetch_add(1, Ordering::SeqCst);
    "landed"
}

async fn redirect_with(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    redirect_to(status, "/echo", "redirecting")
}

async fn absolute(State(state): State<AppState>) -> Response {
    redirect_to(
        StatusCode::FOUND,
        &format!("http://{}/echo", state.addr),
        "moved",
    )
}

async fn redirect_loop() -> Response {
    redirect_to(StatusCode::FOUND, "/loop", "again")
}

async fn bare_redirect() -> Response {
    (StatusCode::FOUND, "no location").into_response()
}

async fn stalled_body() -> Response {
    let chunks = stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b"partial")) })
        .chain(stream::pending());
    Response::new(Body::from_stream(chunks))
}

async fn missing() -> Response {
    (StatusCode::NOT_FOUND, "nope").into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_RESPONSE_DELAY).await;
    "slow"
}
