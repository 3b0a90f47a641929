//! Outcome taxonomy for a single logical stage call.

use thiserror::Error;

use crate::resilience::context::CancelReason;

/// Why a call through the retry executor produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Breaker rejected the call; no network attempt was made.
    #[error("service unavailable (circuit open)")]
    CircuitOpen,

    /// Network-level failure on the last attempt.
    #[error("transport error: {0}")]
    Transport(String),

    /// 429 or 5xx on the last attempt.
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: String },

    #[error("{0}")]
    Cancelled(CancelReason),
}

impl CallError {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallError::CircuitOpen => "circuit_open",
            CallError::Transport(_) => "transport",
            CallError::HttpStatus { .. } => "http_status",
            CallError::Cancelled(_) => "cancelled",
        }
    }
}
