//! Per-run call context: trace identity, deadline and cancellation.

use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::observability::tracing::TraceContext;

/// Why a run stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller went away or cancelled explicitly.
    Caller,
    /// The run deadline passed.
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Caller => write!(f, "cancelled by caller"),
            CancelReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// Triggers cancellation of every clone of the paired [`CallContext`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Context handed to every outbound call of one run.
#[derive(Debug, Clone)]
pub struct CallContext {
    trace: TraceContext,
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

impl CallContext {
    pub fn new(trace: TraceContext) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            trace,
            deadline: None,
            cancel: rx,
        };
        (ctx, CancelHandle { tx })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Non-blocking check.
    pub fn check(&self) -> Result<(), CancelReason> {
        if *self.cancel.borrow() {
            return Err(CancelReason::Caller);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CancelReason::Deadline),
            _ => Ok(()),
        }
    }

    /// Resolves once the run is cancelled or its deadline passes.
    ///
    /// Never resolves if the handle is dropped without cancelling and there
    /// is no deadline.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.cancel.clone();
        let caller = async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = caller => CancelReason::Caller,
                _ = tokio::time::sleep_until(deadline) => CancelReason::Deadline,
            },
            None => {
                caller.await;
                CancelReason::Caller
            }
        }
    }
}
