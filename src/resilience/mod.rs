//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Stage call:
//!     → retries.rs (gate on breaker, attempt, classify, back off)
//!     → circuit_breaker.rs (per-destination failure accounting)
//!     → backoff.rs (100ms, 300ms, 900ms, ... capped)
//!     → context.rs (cancellation and deadline shared by the whole run)
//! ```
//!
//! The breaker registry is the only state shared across concurrent runs.

pub mod backoff;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use context::{CallContext, CancelHandle, CancelReason};
pub use error::CallError;
pub use retries::{RetryExecutor, RetryPolicy};
