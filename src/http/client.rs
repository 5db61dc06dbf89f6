//! GET / form-POST client facade.
//!
//! # Responsibilities
//! - Own a transport whose dial step yields deadline-enforcing connections
//! - Hold the header map, Host override and redirect flag
//! - Issue single round trips, or follow redirects when enabled
//! - Drain and release every response body before returning
//!
//! # Concurrency
//! Requests take `&self`, configuration takes `&mut self`: configure first,
//! then share (clone it or wrap it in an `Arc`). Clones share one connection pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tokio_rustls::rustls::ClientConfig as TlsConfig;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::form::{FormValues, FORM_CONTENT_TYPE};
use crate::http::redirect::{self, DEFAULT_MAX_REDIRECTS, MAX_DRAIN_BYTES};
use crate::net::{tls, TimeoutConnector};
use crate::observability::metrics;

type Transport = Client<TimeoutConnector, Body>;

/// HTTP client with dial and per-operation read/write timeouts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    transport: Transport,
    tls: Arc<TlsConfig>,
    dial_timeout: Duration,
    rw_timeout: Duration,
    headers: Option<BTreeMap<String, String>>,
    redirect: bool,
    host: String,
    max_redirects: usize,
}

/// One request of a (possibly redirected) exchange.
#[derive(Debug)]
struct Outgoing {
    method: Method,
    url: Url,
    body: Option<Bytes>,
    host: Option<String>,
    referer: Option<String>,
    forward_credentials: bool,
}

fn build_transport(dial_timeout: Duration, rw_timeout: Duration, tls: Arc<TlsConfig>) -> Transport {
    Client::builder(TokioExecutor::new())
        .http1_title_case_headers(true)
        .build(TimeoutConnector::with_tls_config(dial_timeout, rw_timeout, tls))
}

impl HttpClient {
    /// Create a client using `timeout` for dialing and for every read and write.
    pub fn new(timeout: Duration) -> Self {
        Self::with_timeouts(timeout, timeout)
    }

    /// Create a client with separate dial and read/write timeouts.
    pub fn with_timeouts(dial_timeout: Duration, rw_timeout: Duration) -> Self {
        let tls = tls::default_client_config();
        Self {
            transport: build_transport(dial_timeout, rw_timeout, tls.clone()),
            tls,
            dial_timeout,
            rw_timeout,
            headers: None,
            redirect: false,
            host: String::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::with_timeouts(
            Duration::from_millis(config.timeouts.dial_ms),
            Duration::from_millis(config.timeouts.read_write_ms),
        );

        if let Some(host) = config.host.as_deref() {
            client.set_host(host);
        }
        for (key, value) in &config.headers {
            client.set_header(key.as_str(), value.as_str());
        }
        if config.redirect.follow {
            client.set_redirect();
        }
        client.set_max_redirects(config.redirect.max_redirects);

        client
    }

    /// Replace the transport with one using `timeout` for dialing and I/O.
    ///
    /// Pooled connections of the old transport are not reused.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.transport = build_transport(timeout, timeout, self.tls.clone());
        self.dial_timeout = timeout;
        self.rw_timeout = timeout;
        tracing::debug!(timeout = ?timeout, "Client timeout updated");
    }

    /// Use `config` for `https` requests instead of the bundled web PKI roots.
    ///
    /// Like [`set_timeout`](Self::set_timeout), this replaces the transport.
    pub fn set_tls_config(&mut self, config: Arc<TlsConfig>) {
        self.transport = build_transport(self.dial_timeout, self.rw_timeout, config.clone());
        self.tls = config;
    }

    /// Follow redirects on subsequent requests.
    pub fn set_redirect(&mut self) {
        self.redirect = true;
    }

    pub fn set_max_redirects(&mut self, max: usize) {
        self.max_redirects = max;
    }

    /// Send `host` as the Host header instead of the URL's authority.
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    /// Set a header sent with every request. `Host` (any case) sets the Host override.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key.eq_ignore_ascii_case("host") {
            self.set_host(value);
            return;
        }
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(key, value.into());
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    pub fn rw_timeout(&self) -> Duration {
        self.rw_timeout
    }

    /// The Host override, if set.
    pub fn host(&self) -> Option<&str> {
        (!self.host.is_empty()).then_some(self.host.as_str())
    }

    /// Configured headers; `None` until the first `set_header`.
    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        self.headers.as_ref()
    }

    pub fn follows_redirects(&self) -> bool {
        self.redirect
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// GET `url`, returning the status and the full body.
    pub async fn get_data(&self, url: &str) -> Result<(StatusCode, Bytes)> {
        self.send(Method::GET, url, None).await
    }

    /// POST `form` to `url` as `application/x-www-form-urlencoded`.
    ///
    /// Configured headers are applied first, so a configured `Content-Type`
    /// is replaced by the form content type.
    pub async fn post_form(&self, url: &str, form: &FormValues) -> Result<(StatusCode, Bytes)> {
        self.send(Method::POST, url, Some(Bytes::from(form.encode())))
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, Bytes)> {
        let started = Instant::now();
        let method_label = method.to_string();

        let result = self.dispatch(method, url, body).await;

        match &result {
            Ok((status, body)) => {
                tracing::debug!(
                    method = %method_label,
                    url = %url,
                    status = %status,
                    bytes = body.len(),
                    elapsed = ?started.elapsed(),
                    "Request complete"
                );
                metrics::record_request(&method_label, status.as_u16(), started);
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(method = %method_label, url = %url, error = %e, "Request timed out");
                metrics::record_error(e.kind());
            }
            Err(e) => {
                tracing::debug!(method = %method_label, url = %url, error = %e, "Request failed");
                metrics::record_error(e.kind());
            }
        }

        result
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, Bytes)> {
        let out = Outgoing {
            method,
            url: parse_url(url)?,
            body,
            host: self.host().map(str::to_owned),
            referer: None,
            forward_credentials: true,
        };

        tracing::debug!(
            method = %out.method,
            url = %out.url,
            host = ?out.host,
            follow_redirects = self.redirect,
            "Sending request"
        );

        if self.redirect {
            return self.follow(out).await;
        }

        let request = self.build_request(&out)?;
        let response = self.round_trip(&out.url, request).await?;
        read_body(response).await
    }

    async fn follow(&self, mut out: Outgoing) -> Result<(StatusCode, Bytes)> {
        let initial_host = out.url.host_str().unwrap_or_default().to_string();
        let host_override = out.host.clone();
        let mut redirects = 0;

        loop {
            let request = self.build_request(&out)?;
            let response = self.round_trip(&out.url, request).await?;
            let status = response.status();

            let hop = redirect::next_hop(status, &out.method);
            let location = redirect::location(response.headers()).map(str::to_owned);
            let (Some(hop), Some(location)) = (hop, location) else {
                return read_body(response).await;
            };

            drain(response).await;

            if redirects >= self.max_redirects {
                return Err(Error::TooManyRedirects(redirects));
            }

            let next_url = redirect::resolve(&out.url, &location)?;
            redirects += 1;
            metrics::record_redirect();

            tracing::debug!(
                status = %status,
                from = %out.url,
                to = %next_url,
                method = %hop.method,
                hop = redirects,
                "Following redirect"
            );

            let host = if redirect::is_relative(&location) {
                host_override.clone()
            } else {
                None
            };
            let forward_credentials = redirect::may_forward_credentials(
                &initial_host,
                next_url.host_str().unwrap_or_default(),
            );

            out = Outgoing {
                referer: redirect::referer(&out.url, &next_url),
                body: if hop.keep_body { out.body.take() } else { None },
                method: hop.method,
                url: next_url,
                host,
                forward_credentials,
            };
        }
    }

    fn build_request(&self, out: &Outgoing) -> Result<Request<Body>> {
        let uri: Uri = out.url.as_str().parse().map_err(axum::http::Error::from)?;

        let body = out.body.clone().map(Body::from).unwrap_or_else(Body::empty);
        let mut request = Request::new(body);
        *request.method_mut() = out.method.clone();
        *request.uri_mut() = uri;

        let headers = request.headers_mut();
        for (key, value) in self.headers.iter().flatten() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| Error::InvalidHeader { name: key.clone() })?;
            if !out.forward_credentials && redirect::is_sensitive(&name) {
                continue;
            }
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidHeader { name: key.clone() })?;
            headers.insert(name, value);
        }

        if let Some(host) = &out.host {
            let value = HeaderValue::from_str(host).map_err(|_| Error::InvalidHeader {
                name: header::HOST.to_string(),
            })?;
            headers.insert(header::HOST, value);
        }

        if let Some(referer) = &out.referer {
            if let Ok(value) = HeaderValue::from_str(referer) {
                headers.insert(header::REFERER, value);
            }
        }

        if out.body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(FORM_CONTENT_TYPE),
            );
        }

        Ok(request)
    }

    async fn round_trip(&self, url: &Url, request: Request<Body>) -> Result<Response<Incoming>> {
        self.transport
            .request(request)
            .await
            .map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })
    }
}

impl Default for HttpClient {
    /// A client without timeouts.
    fn default() -> Self {
        Self::with_timeouts(Duration::ZERO, Duration::ZERO)
    }
}

impl From<&ClientConfig> for HttpClient {
    fn from(config: &ClientConfig) -> Self {
        Self::from_config(config)
    }
}

/// Configuration through a handle that may not hold a client.
///
/// Configuring an absent client is a silent no-op.
pub trait ClientHandle {
    fn set_timeout(&mut self, timeout: Duration);
}

impl ClientHandle for Option<HttpClient> {
    fn set_timeout(&mut self, timeout: Duration) {
        match self {
            Some(client) => client.set_timeout(timeout),
            None => tracing::trace!("set_timeout on absent client ignored"),
        }
    }
}

impl ClientHandle for Option<&mut HttpClient> {
    fn set_timeout(&mut self, timeout: Duration) {
        match self {
            Some(client) => client.set_timeout(timeout),
            None => tracing::trace!("set_timeout on absent client ignored"),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|source| Error::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;

    redirect::check_scheme(url)
}

async fn read_body(response: Response<Incoming>) -> Result<(StatusCode, Bytes)> {
    let status = response.status();
    let body = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
        .await
        .map_err(|source| Error::Body { status, source })?;
    Ok((status, body))
}

/// Read (a bounded amount of) an intermediate body, then release it.
async fn drain(response: Response<Incoming>) {
    let _ = axum::body::to_bytes(Body::new(response.into_body()), MAX_DRAIN_BYTES).await;
}
