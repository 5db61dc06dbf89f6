//! Client error types.

use std::error::Error as StdError;
use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`HttpClient`](crate::HttpClient) requests.
#[derive(Debug, Error)]
pub enum Error {
    /// The URL could not be parsed.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL uses a scheme the transport cannot dial.
    #[error("unsupported URL scheme {0:?}")]
    UnsupportedScheme(String),

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// The request could not be assembled.
    #[error("failed to build request: {0}")]
    Request(#[from] axum::http::Error),

    /// Dial, write or read failed before a response head arrived.
    ///
    /// The message includes every cause in the chain, down to the I/O error.
    #[error("request to {url} failed: {}", chain(.source))]
    Transport {
        url: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The response head arrived but its body could not be read.
    #[error("failed to read response body (status {status}): {source}")]
    Body {
        status: StatusCode,
        #[source]
        source: axum::Error,
    },

    /// A redirect response carried an unusable `Location`.
    #[error("invalid redirect location {location:?}: {reason}")]
    InvalidRedirect { location: String, reason: String },

    /// The redirect limit was reached.
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

impl Error {
    /// Whether a deadline (dial, read or write) elapsed somewhere in the chain.
    pub fn is_timeout(&self) -> bool {
        let mut source: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = source {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                if io_err.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
                if hyper_err.is_timeout() {
                    return true;
                }
            }
            source = err.source();
        }
        false
    }

    /// Whether the failure happened while establishing the connection.
    pub fn is_connect(&self) -> bool {
        matches!(self, Error::Transport { source, .. } if source.is_connect())
    }

    /// Whether the request never left the client because it was malformed.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl { .. }
                | Error::UnsupportedScheme(_)
                | Error::InvalidHeader { .. }
                | Error::Request(_)
        )
    }

    /// Status of the response whose body failed to read, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Body { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Error::InvalidUrl { .. }
            | Error::UnsupportedScheme(_)
            | Error::InvalidHeader { .. }
            | Error::Request(_) => "request",
            _ if self.is_timeout() => "timeout",
            Error::Transport { .. } => "transport",
            Error::Body { .. } => "body",
            Error::InvalidRedirect { .. } | Error::TooManyRedirects(_) => "redirect",
        }
    }
}

/// `err` followed by each of its sources, joined by `": "`.
///
/// Wrappers that repeat their source's message are collapsed.
fn chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
