//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{normalize_url, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: GatewayConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    finalize(config)
}

/// Build configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    finalize(config)
}

fn finalize(mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    for service in &mut config.pipeline.services {
        service.name = service.name.trim().to_string();
        service.url = normalize_url(&service.url);
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply deployment environment variables on top of parsed configuration.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// touching the process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let number = |key: &str| -> Option<u64> {
        lookup(key)?.trim().parse::<i64>().ok().and_then(|n| u64::try_from(n).ok())
    };
    let count = |key: &str| -> Option<u32> { number(key).and_then(|n| u32::try_from(n).ok()) };

    if let Some(port) = number("PORT") {
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(n) = count("PIPELINE_MAX_RETRIES") {
        config.retries.max_retries = n;
    }
    if let Some(ms) = lookup("PIPELINE_RETRY_BACKOFF_MS") {
        // Non-positive or garbage falls back to the stock 100ms base.
        config.retries.base_delay_ms = match ms.trim().parse::<i64>() {
            Ok(n) if n > 0 => n as u64,
            _ => 100,
        };
    }
    if let Some(n) = count("PIPELINE_CIRCUIT_FAILURE_THRESHOLD") {
        config.circuit_breaker.failure_threshold = n;
    }
    if let Some(secs) = number("PIPELINE_CIRCUIT_WINDOW_SEC") {
        config.circuit_breaker.window_secs = secs;
    }
    if let Some(secs) = number("PIPELINE_CIRCUIT_COOLDOWN_SEC") {
        config.circuit_breaker.cooldown_secs = secs;
    }

    for (name, key) in [
        ("validator", "VALIDATOR_URL"),
        ("transformer", "TRANSFORMER_URL"),
        ("enricher", "ENRICHER_URL"),
        ("persister", "PERSISTER_URL"),
    ] {
        if let Some(url) = lookup(key).filter(|u| !u.trim().is_empty()) {
            for service in config.pipeline.services.iter_mut().filter(|s| s.name == name) {
                service.url = url.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PORT", "9000"),
                ("PIPELINE_MAX_RETRIES", "1"),
                ("PIPELINE_CIRCUIT_FAILURE_THRESHOLD", "2"),
                ("PIPELINE_CIRCUIT_COOLDOWN_SEC", "5"),
                ("ENRICHER_URL", "http://localhost:7003"),
            ]),
        );

        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
        assert_eq!(config.retries.max_retries, 1);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.cooldown_secs, 5);
        assert_eq!(config.circuit_breaker.window_secs, 30);
        let enricher = config.pipeline.services.iter().find(|s| s.name == "enricher").unwrap();
        assert_eq!(enricher.url, "http://localhost:7003");
    }

    #[test]
    fn test_bad_numbers_keep_defaults() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PIPELINE_MAX_RETRIES", "-4"),
                ("PIPELINE_CIRCUIT_WINDOW_SEC", "soon"),
                ("PIPELINE_RETRY_BACKOFF_MS", "0"),
            ]),
        );

        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.circuit_breaker.window_secs, 30);
        assert_eq!(config.retries.base_delay_ms, 100);
    }

    #[test]
    fn test_oversized_counts_keep_defaults() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PIPELINE_MAX_RETRIES", "4294967297"),
                ("PIPELINE_CIRCUIT_FAILURE_THRESHOLD", "4294967296"),
            ]),
        );

        assert_eq!(config.retries.max_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_load_config_normalizes_urls() {
        let path = std::env::temp_dir().join(format!("gateway-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[[pipeline.services]]\nname = \" upper \"\nurl = \"localhost:9001\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.pipeline.services[0].name, "upper");
        assert_eq!(config.pipeline.services[0].url, "http://localhost:9001");

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_load_config_reports_validation_errors() {
        let path = std::env::temp_dir().join(format!("gateway-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[circuit_breaker]\nfailure_threshold = 0\n").unwrap();

        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.contains(&ValidationError::ZeroThreshold));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
