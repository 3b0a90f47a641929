//! Failure injection tests for the pipeline gateway.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

mod common;

async fn process(gateway: std::net::SocketAddr, text: &str) -> Value {
    let res = common::client()
        .post(format!("http://{}/process/json", gateway))
        .json(&json!({ "text": text }))
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}

#[tokio::test]
async fn test_failing_stage_halts_pipeline() {
    let hits_b = Arc::new(AtomicU32::new(0));
    let hits_c = Arc::new(AtomicU32::new(0));
    let a = common::spawn_app(common::appending_stage("validator")).await;
    let b = common::spawn_app(common::failing_stage(500, hits_b.clone())).await;
    let c = common::spawn_app(common::flaky_stage("enricher", 0, 200, hits_c.clone())).await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[
        ("validator", a),
        ("transformer", b),
        ("enricher", c),
    ]))
    .await;

    let body = process(gateway, "hi").await;

    assert_eq!(body["stored"], json!(false));
    assert_eq!(body["result"], json!("hi-validator"));
    assert_eq!(body["steps"].as_array().unwrap().len(), 1);
    assert_eq!(body["error"], json!("transformer: HTTP 500"));
    // First attempt plus max_retries.
    assert_eq!(hits_b.load(Ordering::SeqCst), 3);
    assert_eq!(hits_c.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let flaky = common::spawn_app(common::flaky_stage("flaky", 2, 503, hits.clone())).await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[("flaky", flaky)])).await;

    let body = process(gateway, "x").await;

    assert_eq!(body["stored"], json!(true));
    assert_eq!(body["result"], json!("x-flaky"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_limited_stage_is_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let limited = common::spawn_app(common::flaky_stage("limited", 1, 429, hits.clone())).await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[("limited", limited)])).await;

    let body = process(gateway, "x").await;

    assert_eq!(body["stored"], json!(true));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let strict = common::spawn_app(common::failing_stage(422, hits.clone())).await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[("strict", strict)])).await;

    let body = process(gateway, "x").await;

    assert_eq!(body["stored"], json!(false));
    assert_eq!(body["result"], json!("x"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_stage_reports_transport_error() {
    let dead = common::dead_addr().await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[("dead", dead)])).await;

    let body = process(gateway, "x").await;

    assert_eq!(body["stored"], json!(false));
    assert!(body["error"].as_str().unwrap().starts_with("dead: transport error"));
}

#[tokio::test]
async fn test_circuit_opens_and_fails_fast() {
    let hits = Arc::new(AtomicU32::new(0));
    let broken = common::spawn_app(common::failing_stage(500, hits.clone())).await;
    let mut config = common::gateway_config(&[("broken", broken)]);
    config.retries.max_retries = 0;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.cooldown_secs = 60;
    let (gateway, _shutdown) = common::start_gateway(config).await;

    for _ in 0..2 {
        let body = process(gateway, "x").await;
        assert_eq!(body["error"], json!("broken: HTTP 500"));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let body = process(gateway, "x").await;
    assert_eq!(body["stored"], json!(false));
    assert_eq!(body["error"], json!("broken: service unavailable (circuit open)"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let circuits: Value = common::client()
        .get(format!("http://{}/api/circuits", gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let circuits = circuits["circuits"].as_array().unwrap();
    assert_eq!(circuits.len(), 1);
    assert_eq!(circuits[0]["key"], json!(format!("http://{}", broken)));
    assert_eq!(circuits[0]["state"], json!("open"));
}

#[tokio::test]
async fn test_stream_ends_with_error_event() {
    let hits = Arc::new(AtomicU32::new(0));
    let a = common::spawn_app(common::appending_stage("validator")).await;
    let b = common::spawn_app(common::failing_stage(503, hits.clone())).await;
    let c = common::spawn_app(common::appending_stage("enricher")).await;
    let (gateway, _shutdown) = common::start_gateway(common::gateway_config(&[
        ("validator", a),
        ("transformer", b),
        ("enricher", c),
    ]))
    .await;

    let res = common::client()
        .post(format!("http://{}/process/stream", gateway))
        .json(&json!({"text": "hi"}))
        .send()
        .await
        .unwrap();
    let events = common::parse_events(&res.text().await.unwrap());

    assert_eq!(common::event_names(&events), ["started", "step", "error"]);
    let (_, error) = &events[2];
    assert_eq!(error["service"], json!("transformer"));
    assert_eq!(error["error"], json!("HTTP 503"));
}
