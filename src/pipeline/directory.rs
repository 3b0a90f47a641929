//! Ordered stage list, swappable at runtime.
//!
//! Each run takes one snapshot up front, so a concurrent `PUT /api/pipeline`
//! or config reload never changes the stages of a run already in flight.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::config::ServiceConfig;

/// One stage as seen by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStage {
    pub name: String,
    pub base_url: String,
    /// Zero-based index in the pipeline.
    pub position: usize,
}

impl ServiceStage {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            position,
        }
    }

    /// URL the stage's processing request is POSTed to.
    pub fn endpoint(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }

    /// Circuit breaker key: one circuit per destination.
    pub fn circuit_key(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Source of the stage list for new runs.
pub trait ServiceDirectory: Send + Sync {
    fn snapshot(&self) -> Vec<ServiceStage>;
}

/// Lock-free shared stage list backed by `ArcSwap`.
#[derive(Debug)]
pub struct SharedDirectory {
    services: ArcSwap<Vec<ServiceConfig>>,
}

impl SharedDirectory {
    pub fn new(services: Vec<ServiceConfig>) -> Self {
        Self {
            services: ArcSwap::from_pointee(services),
        }
    }

    /// Atomically replace the whole list. Runs already started keep theirs.
    pub fn replace(&self, services: Vec<ServiceConfig>) {
        tracing::info!(
            stages = ?services.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Pipeline updated"
        );
        self.services.store(Arc::new(services));
    }

    pub fn services(&self) -> Arc<Vec<ServiceConfig>> {
        self.services.load_full()
    }
}

impl ServiceDirectory for SharedDirectory {
    fn snapshot(&self) -> Vec<ServiceStage> {
        self.services
            .load()
            .iter()
            .enumerate()
            .map(|(position, service)| ServiceStage::new(&service.name, &service.url, position))
            .collect()
    }
}
