//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Header names and values must be valid HTTP
//! - Redirect settings must be usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid header name {0:?}")]
    HeaderName(String),

    #[error("invalid value for header {0:?}")]
    HeaderValue(String),

    #[error("invalid host override {0:?}")]
    Host(String),

    #[error("redirect.follow is enabled but redirect.max_redirects is 0")]
    NoRedirectsAllowed,

    #[error("unknown log level {0:?}")]
    LogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, value) in &config.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName(name.clone()));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::HeaderValue(name.clone()));
        }
    }

    if let Some(host) = &config.host {
        if HeaderValue::from_str(host).is_err() {
            errors.push(ValidationError::Host(host.clone()));
        }
    }

    if config.redirect.follow && config.redirect.max_redirects == 0 {
        errors.push(ValidationError::NoRedirectsAllowed);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
