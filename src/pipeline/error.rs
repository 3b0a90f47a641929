//! Stage-level failures.

use thiserror::Error;

use crate::resilience::error::CallError;

/// A stage reply that could not be turned into a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,
}

/// Why a pipeline run stopped at a given stage.
#[derive(Debug, Error)]
#[error("{service}: {kind}")]
pub struct StageError {
    pub service: String,
    pub kind: StageErrorKind,
}

impl StageError {
    pub fn new(service: impl Into<String>, kind: impl Into<StageErrorKind>) -> Self {
        Self {
            service: service.into(),
            kind: kind.into(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            StageErrorKind::Call(e) => e.label(),
            StageErrorKind::Rejected { .. } => "rejected",
            StageErrorKind::Decode(_) => "decode",
            StageErrorKind::Encode(_) => "encode",
        }
    }
}

#[derive(Debug, Error)]
pub enum StageErrorKind {
    #[error(transparent)]
    Call(#[from] CallError),

    /// Final non-2xx answer (3xx/4xx) that was not retried.
    #[error("HTTP {status}")]
    Rejected { status: u16, body: String },

    #[error("bad response: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode request: {0}")]
    Encode(serde_json::Error),
}
