//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared breaker, transport, stage directory and orchestrator
//! - Create the Axum router and wire up middleware (limits, request id, tracing)
//! - Apply pipeline updates from the config watcher
//! - Serve until the shutdown signal fires

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::client::{HyperTransport, Transport};
use crate::http::handlers;
use crate::pipeline::directory::SharedDirectory;
use crate::pipeline::orchestrator::Orchestrator;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::retries::{RetryExecutor, RetryPolicy};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub directory: Arc<SharedDirectory>,
    pub breaker: Arc<CircuitBreaker>,
    pub transport: Arc<dyn Transport>,
    pub config: Arc<GatewayConfig>,
}

/// HTTP front end of the pipeline gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_transport(config, Arc::new(HyperTransport::new()))
    }

    /// Build the server on top of a caller-supplied transport.
    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(&config.circuit_breaker));
        let directory = Arc::new(SharedDirectory::new(config.pipeline.services.clone()));
        let executor = RetryExecutor::new(
            transport.clone(),
            breaker.clone(),
            RetryPolicy::from(&config.retries),
        );
        let orchestrator = Arc::new(Orchestrator::new(
            executor,
            directory.clone(),
            Duration::from_secs(config.timeouts.stage_call_secs),
        ));

        let state = AppState {
            orchestrator,
            directory,
            breaker,
            transport,
            config: Arc::new(config),
        };

        let router = Self::build_router(&state);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: &AppState) -> Router {
        let security = &state.config.security;

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route("/health/all", get(handlers::health_all))
            .route("/process", post(handlers::process_form))
            .route("/process/json", post(handlers::process_json))
            .route("/process/stream", post(handlers::process_stream))
            .route(
                "/api/pipeline",
                get(handlers::get_pipeline).put(handlers::put_pipeline),
            )
            .route("/api/circuits", get(handlers::get_circuits))
            .with_state(state.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(security.max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if security.allow_any_origin {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ));
        }
        router
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs arriving on `config_updates` replace the stage list; runs
    /// already in flight keep their snapshot.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            stages = self.state.directory.services().len(),
            "HTTP server starting"
        );

        let directory = self.state.directory.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => directory.replace(config.pipeline.services),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::http::client::mock::{respond, ScriptedTransport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = GatewayConfig::default();
        config.pipeline.services = vec![ServiceConfig::new("echo", "http://echo:9000", "")];
        let transport = Arc::new(ScriptedTransport::new(|req, _| match req.url.as_str() {
            "http://echo:9000/health" => respond(200, json!({"status": "ok"})),
            _ => respond(200, json!({"text": "echoed"})),
        }));
        HttpServer::with_transport(config, transport)
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_buffered_process() {
        let (status, body) = call(server().router, post_json("/process/json", r#"{"text": "in"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], json!(true));
        assert_eq!(body["result"], json!("echoed"));
    }

    #[tokio::test]
    async fn test_mistyped_metadata_keeps_caller_payload() {
        let mut config = GatewayConfig::default();
        config.pipeline.services = vec![ServiceConfig::new("mirror", "http://mirror:9000", "")];
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            let sent: Value = serde_json::from_slice(&req.body).unwrap();
            respond(200, json!({ "payload": sent["payload"] }))
        }));
        let router = HttpServer::with_transport(config, transport).router;

        let body = r#"{"type": "image", "data": "aGk=", "metadata": "x"}"#;
        let (status, body) = call(router, post_json("/process/json", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"], json!({"type": "image", "data": "aGk=", "metadata": {}}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = call(server().router, post_json("/process/json", "{")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_put_pipeline_requires_a_service() {
        let server = server();
        let request = Request::put("/api/pipeline")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"services": []}"#))
            .unwrap();
        let (_, body) = call(server.router.clone(), request).await;

        assert_eq!(body["ok"], json!(false));
        assert_eq!(server.state().directory.services().len(), 1);
    }

    #[tokio::test]
    async fn test_health_all_lists_gateway_first() {
        let request = Request::get("/health/all").body(Body::empty()).unwrap();
        let (_, body) = call(server().router, request).await;

        assert_eq!(body["services"][0]["name"], json!("gateway"));
        assert_eq!(body["services"][1], json!({"name": "echo", "ok": true, "body": {"status": "ok"}}));
    }

    #[tokio::test]
    async fn test_circuits_start_empty() {
        let request = Request::get("/api/circuits").body(Body::empty()).unwrap();
        let (status, body) = call(server().router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"circuits": []}));
    }
}
