//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use axum::{
    extract::Json,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use pipeline_gateway::config::{GatewayConfig, ServiceConfig};
use pipeline_gateway::{HttpServer, Shutdown};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Serve `router` on an ephemeral local port.
pub async fn spawn_app(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A local address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// What a well-behaved stage returns: the input with `-{name}` appended and
/// its own step added to the history.
pub fn append_step(name: &str, body: &Value) -> Value {
    let payload = &body["payload"];
    let input = payload["data"].as_str().unwrap_or_default().to_string();
    let output = format!("{}-{}", input, name);
    let mut steps = body["steps"].as_array().cloned().unwrap_or_default();
    steps.push(json!({"service": name, "input": input, "output": output, "status": "ok"}));
    json!({
        "payload": {
            "type": payload["type"].as_str().unwrap_or("text"),
            "data": output,
            "metadata": payload["metadata"].clone(),
        },
        "steps": steps,
    })
}

fn health_route(router: Router) -> Router {
    router.route("/health", get(|| async { Json(json!({"status": "ok"})) }))
}

/// Stage that always succeeds.
pub fn appending_stage(name: &'static str) -> Router {
    health_route(Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| async move { Json(append_step(name, &body)) }),
    ))
}

/// Stage that answers `status` for its first `failures` calls, then behaves
/// like [`appending_stage`]. Every call is counted in `hits`.
pub fn flaky_stage(name: &'static str, failures: u32, status: u16, hits: Arc<AtomicU32>) -> Router {
    health_route(Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let hits = hits.clone();
            async move {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    let status = StatusCode::from_u16(status).unwrap();
                    (status, Json(json!({"detail": "injected failure"})))
                } else {
                    (StatusCode::OK, Json(append_step(name, &body)))
                }
            }
        }),
    ))
}

/// Stage that always fails with `status`.
pub fn failing_stage(status: u16, hits: Arc<AtomicU32>) -> Router {
    flaky_stage("failing", u32::MAX, status, hits)
}

/// Stage that answers after `delay`.
pub fn slow_stage(name: &'static str, delay: Duration) -> Router {
    health_route(Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| async move {
            tokio::time::sleep(delay).await;
            Json(append_step(name, &body))
        }),
    ))
}

/// Gateway config for the given stages with fast retries.
pub fn gateway_config(stages: &[(&str, SocketAddr)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.pipeline.services = stages
        .iter()
        .map(|(name, addr)| ServiceConfig::new(name, &format!("http://{}", addr), ""))
        .collect();
    config.retries.max_retries = 2;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.timeouts.stage_call_secs = 5;
    config.timeouts.health_check_ms = 500;
    config
}

/// Start the gateway on an ephemeral port. Keep the `Shutdown` alive for
/// the duration of the test.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

/// Split an event-stream body into `(event, data)` pairs.
pub fn parse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = Value::Null;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = name.to_string();
                } else if let Some(raw) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(raw).unwrap();
                }
            }
            (event, data)
        })
        .collect()
}

pub fn event_names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}
