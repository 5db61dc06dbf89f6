//! HTTP request subsystem.
//!
//! # Data Flow
//! ```text
//! get_data / post_form
//!     → client.rs (parse URL, apply headers and Host override)
//!     → form.rs (encode POST body)
//!     → transport round trip (net::TimeoutConnector connections)
//!     → redirect.rs (only when following: next method, target, headers)
//!     → body drained, (status, bytes) returned
//! ```

pub mod client;
pub mod form;
pub mod redirect;

pub use client::{ClientHandle, HttpClient};
pub use form::{FormValues, FORM_CONTENT_TYPE};
