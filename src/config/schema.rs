//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the pipeline gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered pipeline stages.
    pub pipeline: PipelineConfig,

    /// Retry configuration for stage calls.
    pub retries: RetryConfig,

    /// Per-destination circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The ordered list of stages a request is forwarded through.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub services: Vec<ServiceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceConfig::new("validator", "http://validator:8001", "✓"),
                ServiceConfig::new("transformer", "http://transformer:8002", "⇅"),
                ServiceConfig::new("enricher", "http://enricher:8003", "⊕"),
                ServiceConfig::new("persister", "http://persister:8004", "💾"),
            ],
        }
    }
}

/// One backend service in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Display and log identifier.
    pub name: String,

    /// Base URL; stage requests are POSTed to `{url}/`.
    pub url: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input_type: String,

    #[serde(default)]
    pub output_type: String,
}

impl ServiceConfig {
    pub fn new(name: &str, url: &str, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            icon: icon.to_string(),
            description: String::new(),
            input_type: String::new(),
            output_type: String::new(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts beyond the first.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Ceiling for any single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied after each attempt.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 3,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that trip the circuit.
    pub failure_threshold: u32,

    /// Failures older than this no longer count toward the threshold.
    pub window_secs: u64,

    /// How long an open circuit rejects calls before admitting a trial.
    pub cooldown_secs: u64,

    /// Admit at most one trial call while half-open.
    pub single_probe: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 30,
            cooldown_secs: 30,
            single_probe: false,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt timeout for a stage call in seconds.
    pub stage_call_secs: u64,

    /// Deadline for a whole pipeline run in seconds (0 disables).
    pub run_secs: u64,

    /// Timeout for each stage liveness probe in milliseconds.
    pub health_check_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stage_call_secs: 120,
            run_secs: 0,
            health_check_ms: 2000,
        }
    }
}

impl TimeoutConfig {
    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_secs > 0).then(|| Duration::from_secs(self.run_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Send `Access-Control-Allow-Origin: *` on every response.
    pub allow_any_origin: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 32 * 1024 * 1024, // base64 media payloads
            allow_any_origin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.pipeline.services.len(), 4);
        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.retries.multiplier, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.timeouts.run_deadline().is_none());
    }

    #[test]
    fn test_pipeline_section_replaces_default_services() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [retries]
            max_retries = 1

            [[pipeline.services]]
            name = "upper"
            url = "http://localhost:9001"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.services.len(), 1);
        assert_eq!(config.pipeline.services[0].name, "upper");
        assert_eq!(config.retries.max_retries, 1);
        assert_eq!(config.retries.base_delay_ms, 100);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
