//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client requests produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing a subscriber or recorder is the caller's choice
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
