//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (trace ids shared by every stage of a run)
//! ```

pub mod logging;
pub mod metrics;
pub mod tracing;
