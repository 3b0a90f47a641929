//! Route handlers.

use axum::{
    body::Body,
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::validation::{normalize_url, validate_services};
use crate::config::ServiceConfig;
use crate::health::{probe_stages, ServiceHealth};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::observability::tracing::TraceContext;
use crate::pipeline::directory::ServiceDirectory;
use crate::pipeline::orchestrator::RunReport;
use crate::pipeline::payload::{FormRequest, Payload, ProcessRequest};
use crate::pipeline::stream::{StreamEmitter, StreamEvent};
use crate::resilience::context::{CallContext, CancelHandle};

const DEFAULT_ICON: &str = "•";

fn bad_request(detail: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail.into() }))).into_response()
}

/// Context for one run: continues the caller's trace, applies the run deadline.
fn new_context(state: &AppState, headers: &HeaderMap) -> (CallContext, CancelHandle) {
    let (ctx, handle) = CallContext::new(TraceContext::from_headers(headers));
    match state.config.timeouts.run_deadline() {
        Some(deadline) => (ctx.with_timeout(deadline), handle),
        None => (ctx, handle),
    }
}

async fn run_buffered(state: &AppState, headers: &HeaderMap, payload: Payload, mode: &'static str) -> RunReport {
    // Dropping the handler future (caller gone) drops the run with it.
    let (ctx, _cancel) = new_context(state, headers);
    let trace_id = ctx.trace().trace_id().to_string();
    let outcome = state.orchestrator.run(&ctx, payload).await;
    metrics::record_pipeline_run(mode, outcome.completed);
    outcome.into_report(trace_id)
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "gateway"}))
}

pub async fn health_all(State(state): State<AppState>) -> Json<Value> {
    let stages = state.directory.snapshot();
    let timeout = Duration::from_millis(state.config.timeouts.health_check_ms);

    let mut services = vec![ServiceHealth::gateway()];
    services.extend(probe_stages(state.transport.as_ref(), &stages, timeout).await);
    Json(json!({ "services": services }))
}

pub async fn process_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let payload = match body {
        Ok(Json(request)) => Payload::from(request),
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    Json(run_buffered(&state, &headers, payload, "json").await).into_response()
}

pub async fn process_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Form<FormRequest>, FormRejection>,
) -> Response {
    let payload = match body {
        Ok(Form(form)) => Payload::from(form),
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    Json(run_buffered(&state, &headers, payload, "form").await).into_response()
}

/// Streaming run. Events are forwarded frame by frame as the run progresses;
/// a consumer that disconnects cancels the run.
pub async fn process_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let payload = match body {
        Ok(Json(request)) => Payload::from(request),
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let (ctx, cancel) = new_context(&state, &headers);
    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        let trace_id = ctx.trace().trace_id().to_string();
        let consumer = tx.clone();
        let mut emitter = StreamEmitter::new(tx);

        let run = orchestrator.run_observed(&ctx, payload, &mut emitter);
        tokio::pin!(run);
        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            _ = consumer.closed() => {
                tracing::info!(trace_id = %trace_id, "Stream consumer disconnected, cancelling run");
                cancel.cancel();
                run.await
            }
        };
        metrics::record_pipeline_run("stream", outcome.completed);
    });

    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(Bytes::from(event.to_frame())), rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// One service in a `PUT /api/pipeline` body.
#[derive(Debug, Deserialize)]
pub struct ServiceUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub output_type: Option<String>,
}

impl From<ServiceUpdate> for ServiceConfig {
    fn from(update: ServiceUpdate) -> Self {
        let trimmed = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();
        let icon = trimmed(update.icon);
        Self {
            name: update.name.trim().to_string(),
            url: normalize_url(&update.url),
            icon: if icon.is_empty() { DEFAULT_ICON.to_string() } else { icon },
            description: trimmed(update.description),
            input_type: trimmed(update.input_type),
            output_type: trimmed(update.output_type),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PipelineUpdate {
    #[serde(default)]
    pub services: Vec<ServiceUpdate>,
}

pub async fn get_pipeline(State(state): State<AppState>) -> Json<Value> {
    let services: Vec<ServiceConfig> = state
        .directory
        .services()
        .iter()
        .cloned()
        .map(|mut service| {
            if service.icon.trim().is_empty() {
                service.icon = DEFAULT_ICON.to_string();
            }
            service
        })
        .collect();
    Json(json!({ "services": services }))
}

pub async fn put_pipeline(
    State(state): State<AppState>,
    body: Result<Json<PipelineUpdate>, JsonRejection>,
) -> Json<Value> {
    let Ok(Json(update)) = body else {
        return Json(json!({"ok": false, "detail": "Invalid JSON"}));
    };

    let services: Vec<ServiceConfig> = update.services.into_iter().map(ServiceConfig::from).collect();
    if let Some(error) = validate_services(&services).first() {
        tracing::warn!(error = %error, "Rejected pipeline update");
        return Json(json!({"ok": false, "detail": error.to_string()}));
    }

    state.directory.replace(services);
    Json(json!({"ok": true}))
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "circuits": state.breaker.snapshot() }))
}
