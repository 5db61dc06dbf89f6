//! HTTP client with connection-level read/write deadlines.
//!
//! Every connection the client dials is wrapped in a [`TimeoutConnection`],
//! which arms a fresh deadline before each read and each write, so a stalled
//! peer fails the request with a timeout error instead of hanging it.
//! `https` URLs run their TLS handshake over that same wrapper.
//!
//! ```no_run
//! use std::time::Duration;
//! use timeout_client::{FormValues, HttpClient};
//!
//! # async fn run() -> timeout_client::Result<()> {
//! let mut client = HttpClient::new(Duration::from_secs(5));
//! client.set_header("Host", "example.com");
//! client.set_header("User-Agent", "timeout-client/1.0");
//!
//! let (status, body) = client.get_data("http://127.0.0.1:8080/").await?;
//! println!("{status}: {} bytes", body.len());
//!
//! let form: FormValues = [("a", "1"), ("b", "2 ")].into_iter().collect();
//! let (status, _) = client.post_form("http://127.0.0.1:8080/submit", &form).await?;
//! println!("{status}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod observability;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use http::{ClientHandle, FormValues, HttpClient};
pub use net::{TimeoutConnection, TimeoutConnector};
