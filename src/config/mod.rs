//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, env overrides, URL normalization)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the pipeline snapshot
//! ```
//!
//! Retry and circuit breaker settings are read once at startup; only the
//! stage list is hot-reloaded.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::GatewayConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::RetryConfig;
pub use schema::ServiceConfig;
