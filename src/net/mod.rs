//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request needs a connection
//!     → connector.rs (DNS + TCP dial, bounded by the dial timeout)
//!     → timeout_conn.rs (wrap stream; every read/write gets a fresh deadline)
//!     → tls.rs config, handshake over the wrapped stream (https only)
//!     → Hand off to the hyper connection pool
//! ```
//!
//! # Design Decisions
//! - Deadlines live on the connection, so they also cover pooled reuse
//! - Timeout failures surface as `io::ErrorKind::TimedOut`

pub mod connector;
pub mod timeout_conn;
pub mod tls;

pub use connector::{TimeoutConnector, TimeoutStream};
pub use timeout_conn::TimeoutConnection;
