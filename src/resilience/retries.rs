//! Retry executor.
//!
//! # Responsibilities
//! - Gate every logical call on the circuit breaker (fail fast when open)
//! - Retry transport errors, 429 and 5xx with exponential backoff
//! - Report each attempt's outcome to the breaker
//! - Abort promptly on cancellation or deadline, during waits and in flight
//!
//! # Classification
//! ```text
//! transport error   → retry, breaker failure
//! 429 / 5xx         → retry, breaker failure
//! 2xx               → return, breaker success
//! other (3xx, 4xx)  → return, breaker success (client errors are not outages)
//! cancelled         → return, no breaker accounting
//! ```

use axum::http::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::http::client::{OutboundRequest, Transport, TransportResponse};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::context::CallContext;
use crate::resilience::error::CallError;

/// How an HTTP status is treated by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Final,
}

pub fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Retryable
    } else {
        StatusClass::Final
    }
}

/// Retry limits and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts beyond the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.multiplier, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

/// Issues one logical call with retries, cooperating with the breaker.
pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn Transport>, breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            breaker,
            policy,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Send `request`, retrying transient failures. `key` names the circuit.
    ///
    /// Returns the response for any 2xx or non-retryable status; the caller
    /// decides what a non-2xx final response means.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        key: &str,
        request: &OutboundRequest,
    ) -> Result<TransportResponse, CallError> {
        if !self.breaker.allow(key) {
            tracing::warn!(key = %key, url = %request.url, "Circuit open, failing fast");
            metrics::record_circuit_rejection(key);
            return Err(CallError::CircuitOpen);
        }

        let mut backoff = self.policy.backoff();
        let mut attempt: u32 = 0;

        loop {
            let start = Instant::now();
            let result = tokio::select! {
                biased;
                reason = ctx.cancelled() => return Err(CallError::Cancelled(reason)),
                result = self.transport.send(request.clone()) => result,
            };

            let error = match result {
                Ok(response) => match classify(response.status) {
                    StatusClass::Success | StatusClass::Final => {
                        self.breaker.record_success(key);
                        metrics::record_stage_call(key, response.status.as_str(), start);
                        return Ok(response);
                    }
                    StatusClass::Retryable => {
                        self.breaker.record_failure(key);
                        metrics::record_stage_call(key, response.status.as_str(), start);
                        CallError::HttpStatus {
                            status: response.status.as_u16(),
                            body: String::from_utf8_lossy(&response.body).into_owned(),
                        }
                    }
                },
                Err(e) => {
                    self.breaker.record_failure(key);
                    metrics::record_stage_call(key, "transport_error", start);
                    CallError::Transport(e.to_string())
                }
            };

            if attempt >= self.policy.max_retries {
                tracing::warn!(key = %key, attempts = attempt + 1, error = %error, "Retries exhausted");
                return Err(error);
            }
            attempt += 1;

            let delay = backoff.next_delay();
            tracing::info!(key = %key, attempt, delay = ?delay, error = %error, "Retrying stage call");
            metrics::record_retry(key);

            tokio::select! {
                biased;
                reason = ctx.cancelled() => return Err(CallError::Cancelled(reason)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
