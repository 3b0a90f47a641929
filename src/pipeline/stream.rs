//! Progress event protocol for streaming runs.
//!
//! # Ordering
//! ```text
//! started → step* → (done | error)
//! ```
//! Nothing is emitted before `started` or after the terminal event. Each event
//! is handed to the sink as soon as it happens; the HTTP layer writes every
//! frame as its own body chunk.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::pipeline::orchestrator::{RunObserver, RunOutcome};
use crate::pipeline::payload::{Payload, StepRecord};
use crate::pipeline::error::StageError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Started {
        trace_id: String,
        payload: Payload,
    },
    Step(StepRecord),
    Error {
        service: String,
        error: String,
    },
    Done {
        trace_id: String,
        result: String,
        steps: Vec<Value>,
        payload: Payload,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Started { .. } => "started",
            StreamEvent::Step(_) => "step",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done { .. } => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::Done { .. })
    }

    /// `event: <name>\ndata: <json>\n\n`
    pub fn to_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.name(), data)
    }
}

/// Where emitted events go.
pub trait EventSink: Send {
    /// Returns false once the consumer is gone.
    fn send(&mut self, event: StreamEvent) -> bool;
}

impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn send(&mut self, event: StreamEvent) -> bool {
        mpsc::UnboundedSender::send(self, event).is_ok()
    }
}

impl EventSink for Vec<StreamEvent> {
    fn send(&mut self, event: StreamEvent) -> bool {
        self.push(event);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Open,
    Closed,
}

/// Enforces the event ordering on top of any sink.
pub struct StreamEmitter<S> {
    sink: S,
    phase: Phase,
}

impl<S: EventSink> StreamEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            phase: Phase::Pending,
        }
    }

    /// Emit `event` if the ordering allows it. Returns whether it was sent.
    pub fn emit(&mut self, event: StreamEvent) -> bool {
        let allowed = match (self.phase, &event) {
            (Phase::Pending, StreamEvent::Started { .. }) => true,
            (Phase::Open, StreamEvent::Started { .. }) => false,
            (Phase::Open, _) => true,
            _ => false,
        };
        if !allowed {
            tracing::debug!(event = event.name(), phase = ?self.phase, "Dropping out-of-order stream event");
            return false;
        }

        self.phase = if event.is_terminal() { Phase::Closed } else { Phase::Open };
        if !self.sink.send(event) {
            self.phase = Phase::Closed;
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: EventSink> RunObserver for StreamEmitter<S> {
    fn on_started(&mut self, trace_id: &str, payload: &Payload) {
        self.emit(StreamEvent::Started {
            trace_id: trace_id.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_step(&mut self, step: &StepRecord) {
        self.emit(StreamEvent::Step(step.clone()));
    }

    fn on_error(&mut self, error: &StageError) {
        self.emit(StreamEvent::Error {
            service: error.service.clone(),
            error: error.kind.to_string(),
        });
    }

    fn on_done(&mut self, trace_id: &str, outcome: &RunOutcome) {
        self.emit(StreamEvent::Done {
            trace_id: trace_id.to_string(),
            result: outcome.payload.data.clone(),
            steps: outcome.steps.clone(),
            payload: outcome.payload.clone(),
        });
    }
}
