//! Sequential pipeline driver.
//!
//! # Run Loop
//! ```text
//! snapshot stages
//!   → for each stage: StageRequest → RetryExecutor → StageReply
//!       ok:   adopt payload, maybe replace history, report step
//!       fail: report error, stop (no later stage runs)
//!   → done (completed = true)
//! ```
//!
//! The same loop serves buffered and streaming callers; streaming callers
//! pass a [`RunObserver`] that turns milestones into events.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::http::client::OutboundRequest;
use crate::pipeline::directory::{ServiceDirectory, ServiceStage};
use crate::pipeline::error::{StageError, StageErrorKind};
use crate::pipeline::payload::{Payload, StageReply, StageRequest, StepRecord};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::context::CallContext;
use crate::resilience::retries::RetryExecutor;

/// Milestone callbacks for one run. All methods default to no-ops.
pub trait RunObserver: Send {
    fn on_started(&mut self, _trace_id: &str, _payload: &Payload) {}
    fn on_step(&mut self, _step: &StepRecord) {}
    fn on_error(&mut self, _error: &StageError) {}
    fn on_done(&mut self, _trace_id: &str, _outcome: &RunOutcome) {}
}

impl RunObserver for () {}

/// What a run ended with.
#[derive(Debug)]
pub struct RunOutcome {
    /// Final payload, or the last good one when the run halted.
    pub payload: Payload,
    pub steps: Vec<Value>,
    /// Every stage succeeded.
    pub completed: bool,
    pub failure: Option<StageError>,
}

impl RunOutcome {
    pub fn into_report(self, trace_id: impl Into<String>) -> RunReport {
        RunReport {
            trace_id: trace_id.into(),
            result: self.payload.data.clone(),
            stored: self.completed,
            steps: self.steps,
            payload: self.payload,
            error: self.failure.map(|e| e.to_string()),
        }
    }
}

/// Buffered response body: `{trace_id, result, stored, steps, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub trace_id: String,
    pub result: String,
    pub stored: bool,
    pub steps: Vec<Value>,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Orchestrator {
    executor: RetryExecutor,
    directory: Arc<dyn ServiceDirectory>,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(executor: RetryExecutor, directory: Arc<dyn ServiceDirectory>, call_timeout: Duration) -> Self {
        Self {
            executor,
            directory,
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    /// Buffered run.
    pub async fn run(&self, ctx: &CallContext, initial: Payload) -> RunOutcome {
        self.run_observed(ctx, initial, &mut ()).await
    }

    /// Run, reporting each milestone to `observer` as it happens.
    pub async fn run_observed<O>(&self, ctx: &CallContext, initial: Payload, observer: &mut O) -> RunOutcome
    where
        O: RunObserver + ?Sized,
    {
        let trace_id = ctx.trace().trace_id().to_string();
        let stages = self.directory.snapshot();
        tracing::info!(trace_id = %trace_id, stages = stages.len(), payload_type = %initial.kind, "Pipeline run started");
        observer.on_started(&trace_id, &initial);

        let mut payload = initial;
        let mut steps: Vec<Value> = Vec::new();

        for stage in &stages {
            let reply = match self.call_stage(ctx, stage, &payload, &steps).await {
                Ok(reply) => reply,
                Err(error) => {
                    tracing::warn!(
                        trace_id = %trace_id,
                        service = %error.service,
                        reason = error.label(),
                        error = %error.kind,
                        "Pipeline halted"
                    );
                    observer.on_error(&error);
                    return RunOutcome {
                        payload,
                        steps,
                        completed: false,
                        failure: Some(error),
                    };
                }
            };

            let replaced = reply.steps.is_some();
            if let Some(history) = reply.steps {
                steps = history;
            }
            let reported = if replaced { steps.last() } else { None };
            let record = StepRecord::describe(&stage.name, &payload, &reply.payload, reported);
            observer.on_step(&record);
            payload = reply.payload;
        }

        tracing::info!(trace_id = %trace_id, steps = steps.len(), "Pipeline run completed");
        let outcome = RunOutcome {
            payload,
            steps,
            completed: true,
            failure: None,
        };
        observer.on_done(&trace_id, &outcome);
        outcome
    }

    async fn call_stage(
        &self,
        ctx: &CallContext,
        stage: &ServiceStage,
        payload: &Payload,
        steps: &[Value],
    ) -> Result<StageReply, StageError> {
        let body = serde_json::to_vec(&StageRequest::new(payload, steps))
            .map_err(|e| StageError::new(&stage.name, StageErrorKind::Encode(e)))?;

        let mut request = OutboundRequest::post_json(stage.endpoint(), Bytes::from(body), self.call_timeout);
        ctx.trace().child().inject(&mut request.headers);

        let response = self
            .executor
            .execute(ctx, stage.circuit_key(), &request)
            .await
            .map_err(|e| StageError::new(&stage.name, e))?;

        if !response.status.is_success() {
            return Err(StageError::new(
                &stage.name,
                StageErrorKind::Rejected {
                    status: response.status.as_u16(),
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                },
            ));
        }

        let reply = StageReply::parse(&response.body).map_err(|e| StageError::new(&stage.name, e))?;
        tracing::debug!(
            service = %stage.name,
            position = stage.position,
            payload_type = %reply.payload.kind,
            "Stage completed"
        );
        Ok(reply)
    }
}
