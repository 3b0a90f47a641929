//! Stage health fan-out.
//!
//! # Responsibilities
//! - Probe `GET {base}/health` on every stage with a short timeout
//! - Report reachability in pipeline order
//!
//! Probes bypass the retry executor and never touch breaker state.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::http::client::{OutboundRequest, Transport};
use crate::pipeline::directory::ServiceStage;

/// One entry of `GET /health/all`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub ok: bool,
    pub body: Value,
}

impl ServiceHealth {
    /// The gateway's own entry.
    pub fn gateway() -> Self {
        Self {
            name: "gateway".to_string(),
            ok: true,
            body: json!({"status": "ok", "service": "gateway"}),
        }
    }
}

/// Probe every stage concurrently; results keep the order of `stages`.
pub async fn probe_stages(transport: &dyn Transport, stages: &[ServiceStage], timeout: Duration) -> Vec<ServiceHealth> {
    let probes = stages.iter().map(|stage| probe(transport, stage, timeout));
    futures_util::future::join_all(probes).await
}

async fn probe(transport: &dyn Transport, stage: &ServiceStage, timeout: Duration) -> ServiceHealth {
    let url = stage.health_url();
    let (ok, body) = match transport.send(OutboundRequest::get(&url, timeout)).await {
        Ok(response) => {
            let body = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
            (response.status.is_success(), body)
        }
        Err(e) => {
            tracing::debug!(service = %stage.name, url = %url, error = %e, "Health probe failed");
            (false, json!({"error": e.to_string()}))
        }
    };
    ServiceHealth {
        name: stage.name.clone(),
        ok,
        body,
    }
}
