//! Circuit breaker for stage protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: destination assumed down, calls fail fast
//! - Half-Open: cooldown elapsed, trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within window
//! Open → Half-Open: first allow() after cooldown since last failure
//! Half-Open → Closed: any success
//! Half-Open → Open: any failure (cooldown re-armed from that failure)
//! ```
//!
//! Records are keyed by destination and created lazily on the first
//! failure. A key with no record is implicitly closed. Each operation runs
//! under the shard lock for its key, so `allow` can transition Open →
//! Half-Open without racing `record_success`/`record_failure`.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit state for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl Circuit {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_attempt: None,
        }
    }
}

/// Point-in-time view of one circuit, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

/// Per-destination circuit breaker registry.
///
/// Constructed once by the server and shared by every run through an `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuits: DashMap<String, Circuit>,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    single_probe: bool,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            threshold: config.failure_threshold.max(1),
            window: config.window(),
            cooldown: config.cooldown(),
            single_probe: config.single_probe,
        }
    }

    /// Decide whether a call to `key` may be attempted.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open here.
    pub fn allow(&self, key: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(key) else {
            return true;
        };
        let now = Instant::now();

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = circuit
                    .last_failure
                    .map_or(true, |t| now.duration_since(t) >= self.cooldown);
                if !cooled {
                    return false;
                }
                circuit.state = CircuitState::HalfOpen;
                circuit.last_attempt = Some(now);
                tracing::info!(key = %key, "Circuit half-open, admitting trial call");
                metrics::record_circuit_state(key, CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => {
                if !self.single_probe {
                    return true;
                }
                // A probe that never reported back is abandoned after one cooldown.
                match circuit.last_attempt {
                    Some(t) if now.duration_since(t) < self.cooldown => false,
                    _ => {
                        circuit.last_attempt = Some(now);
                        true
                    }
                }
            }
        }
    }

    /// Record a successful call. No-op for keys that never failed.
    pub fn record_success(&self, key: &str) {
        let Some(mut circuit) = self.circuits.get_mut(key) else {
            return;
        };
        if circuit.state != CircuitState::Closed {
            tracing::info!(key = %key, previous = ?circuit.state, "Circuit closed");
            metrics::record_circuit_state(key, CircuitState::Closed);
        }
        circuit.state = CircuitState::Closed;
        circuit.failure_count = 0;
    }

    /// Record a failed call, opening the circuit once the threshold is hit.
    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let mut circuit = self
            .circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::closed);
        circuit.last_attempt = Some(now);

        if circuit.state == CircuitState::HalfOpen {
            circuit.state = CircuitState::Open;
            circuit.last_failure = Some(now);
            circuit.failure_count = self.threshold;
            tracing::warn!(key = %key, "Trial call failed, circuit re-opened");
            metrics::record_circuit_state(key, CircuitState::Open);
            return;
        }

        if circuit.state == CircuitState::Closed {
            if let Some(last) = circuit.last_failure {
                if now.duration_since(last) > self.window {
                    circuit.failure_count = 0;
                }
            }
        }

        circuit.failure_count += 1;
        circuit.last_failure = Some(now);

        if circuit.state == CircuitState::Closed && circuit.failure_count >= self.threshold {
            circuit.state = CircuitState::Open;
            tracing::warn!(
                key = %key,
                failures = circuit.failure_count,
                cooldown = ?self.cooldown,
                "Circuit opened"
            );
            metrics::record_circuit_state(key, CircuitState::Open);
        }
    }

    /// Current state of `key` (closed when no record exists).
    pub fn state(&self, key: &str) -> CircuitState {
        self.circuits
            .get(key)
            .map_or(CircuitState::Closed, |c| c.state)
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.circuits.get(key).map_or(0, |c| c.failure_count)
    }

    /// All known circuits, sorted by key.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut circuits: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| CircuitSnapshot {
                key: entry.key().clone(),
                state: entry.value().state,
                failure_count: entry.value().failure_count,
            })
            .collect();
        circuits.sort_by(|a, b| a.key.cmp(&b.key));
        circuits
    }
}
