//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::http::redirect::DEFAULT_MAX_REDIRECTS;

/// Root configuration for an [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Dial and read/write timeouts.
    pub timeouts: TimeoutConfig,

    /// Redirect following.
    pub redirect: RedirectConfig,

    /// Host header override (virtual hosting).
    pub host: Option<String>,

    /// Headers sent with every request. A `Host` entry sets the override.
    pub headers: BTreeMap<String, String>,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Timeout configuration. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub dial_ms: u64,

    /// Per read/write operation timeout in milliseconds.
    pub read_write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_ms: 30_000,
            read_write_ms: 30_000,
        }
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedirectConfig {
    /// Follow 3xx responses instead of returning them.
    pub follow: bool,

    /// Maximum redirects followed per request.
    pub max_redirects: usize,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
