//! TLS client configuration.
//!
//! The handshake itself runs in [`crate::net::connector`], on top of the
//! deadline-enforcing connection, so it is bounded like any other I/O.

use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, InvalidDnsNameError, ServerName};
use tokio_rustls::rustls::{ClientConfig, Error, RootCertStore};

/// ALPN protocols offered by default. The transport only speaks HTTP/1.1.
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Client configuration trusting the bundled webpki roots.
pub fn default_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(build(roots))
}

/// Client configuration trusting only `certs`.
///
/// Used for private CAs and self-signed test servers.
pub fn client_config_with_roots<I>(certs: I) -> Result<Arc<ClientConfig>, Error>
where
    I: IntoIterator<Item = CertificateDer<'static>>,
{
    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert)?;
    }
    Ok(Arc::new(build(roots)))
}

fn build(roots: RootCertStore) -> ClientConfig {
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];
    config
}

/// Server name to verify for `host`, as it appears in a URI authority.
///
/// IPv6 literals arrive bracketed (`[::1]`); the brackets are stripped.
pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>, InvalidDnsNameError> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    ServerName::try_from(host.to_string())
}
