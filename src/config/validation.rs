//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics. Every problem is
//! reported, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, ServiceConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("pipeline must contain at least one service")]
    EmptyPipeline,

    #[error("service #{0} has no name")]
    MissingName(usize),

    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    #[error("service '{name}' has invalid url '{url}'")]
    InvalidUrl { name: String, url: String },

    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroThreshold,

    #[error("retries.multiplier must be at least 1")]
    ZeroMultiplier,

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Ensure a stage URL carries a scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        return url.to_string();
    }
    format!("http://{}", url)
}

/// Check the pipeline service list on its own (also used by `PUT /api/pipeline`).
pub fn validate_services(services: &[ServiceConfig]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if services.is_empty() {
        errors.push(ValidationError::EmptyPipeline);
        return errors;
    }

    let mut seen = HashSet::new();
    for (i, service) in services.iter().enumerate() {
        let name = service.name.trim();
        if name.is_empty() {
            errors.push(ValidationError::MissingName(i));
            continue;
        }
        if !seen.insert(name.to_string()) {
            errors.push(ValidationError::DuplicateName(name.to_string()));
        }
        if Url::parse(&normalize_url(&service.url)).is_err() {
            errors.push(ValidationError::InvalidUrl {
                name: name.to_string(),
                url: service.url.clone(),
            });
        }
    }
    errors
}

/// Validate a whole configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    errors.extend(validate_services(&config.pipeline.services));

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold);
    }
    if config.retries.multiplier == 0 {
        errors.push(ValidationError::ZeroMultiplier);
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
