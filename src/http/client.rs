//! Outbound HTTP transport.
//!
//! # Responsibilities
//! - Send one request to a stage and return status, headers and full body
//! - Enforce the per-attempt timeout
//! - Keep the request body re-readable across retries
//!
//! Bodies are `Bytes`: cloning shares the buffer, so every retry re-reads the
//! complete body from the start.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use bytes::Bytes;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use std::time::Duration;
use thiserror::Error;

/// Largest stage response body the gateway will buffer.
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// A request ready to be sent (possibly several times).
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn post_json(url: impl Into<String>, body: Bytes, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body,
            timeout,
        }
    }

    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout,
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Network-level failures. Any HTTP status, even 5xx, is a response, not an error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Send-a-request primitive used for every stage and health call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// hyper-util backed transport (plain HTTP, pooled connections).
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
        }
        let req = builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), MAX_RESPONSE_BYTES)
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;
            Ok(TransportResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(request.timeout)),
        }
    }
}
