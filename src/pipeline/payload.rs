//! Canonical payload envelope and the shapes around it.
//!
//! Every stage speaks `{type, data, metadata}`. Incoming requests and stage
//! replies come in several legacy shapes; they are folded into a [`Payload`]
//! exactly once, at the boundary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::error::DecodeError;

/// Preview budget for text payloads, in characters.
pub const PREVIEW_LIMIT: usize = 80;

pub const ELLIPSIS: char = '…';

pub const TEXT: &str = "text";

fn default_kind() -> String {
    TEXT.to_string()
}

fn kind_or_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|kind| !kind.is_empty())
        .unwrap_or_else(default_kind))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The envelope passed from stage to stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// `text`, `image`, `video`, `binary`, ...
    #[serde(rename = "type", default = "default_kind", deserialize_with = "kind_or_text")]
    pub kind: String,

    /// Raw text for `text`, base64 for binary-like kinds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

impl Default for Payload {
    fn default() -> Self {
        Self::text("")
    }
}

impl Payload {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            kind: default_kind(),
            data: data.into(),
            metadata: Map::new(),
        }
    }

    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
            metadata: Map::new(),
        }
    }

    /// Build from a JSON object, tolerating missing or mistyped fields.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map_or_else(default_kind, str::to_string);
        let data = match object.get("data") {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            kind,
            data,
            metadata: metadata_of(object),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT
    }

    /// Media whose data must never be shown in previews.
    pub fn is_binary_like(&self) -> bool {
        matches!(self.kind.as_str(), "image" | "video" | "binary")
    }

    /// Short human-readable rendering for step events.
    pub fn preview(&self) -> String {
        if self.is_binary_like() {
            format!("[{}] {} chars", self.kind, self.data.len())
        } else {
            truncate_preview(&self.data)
        }
    }
}

fn metadata_of(object: &Map<String, Value>) -> Map<String, Value> {
    match object.get("metadata") {
        Some(Value::Object(meta)) => meta.clone(),
        _ => Map::new(),
    }
}

/// Cut `text` to [`PREVIEW_LIMIT`] characters, marking the cut with an ellipsis.
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((cut, _)) => {
            let mut preview = String::with_capacity(cut + ELLIPSIS.len_utf8());
            preview.push_str(&text[..cut]);
            preview.push(ELLIPSIS);
            preview
        }
        None => text.to_string(),
    }
}

/// Body of `POST /process/json` and `/process/stream`.
///
/// Any JSON object is accepted; the fields are read tolerantly so one
/// mistyped field never discards the rest of the caller's payload.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ProcessRequest(Map<String, Value>);

impl ProcessRequest {
    /// Fold the body into a payload. In priority order: a `payload` object,
    /// then `type` with `data`, then a string `text`, then empty text.
    pub fn into_payload(self) -> Payload {
        let body = self.0;
        if let Some(Value::Object(envelope)) = body.get("payload") {
            return Payload::from_object(envelope);
        }
        if body.contains_key("type") && body.contains_key("data") {
            return Payload::from_object(&body);
        }
        match body.get("text") {
            Some(Value::String(text)) => Payload::text(text.as_str()),
            _ => Payload::default(),
        }
    }
}

impl From<ProcessRequest> for Payload {
    fn from(request: ProcessRequest) -> Self {
        request.into_payload()
    }
}

/// Urlencoded body of `POST /process`.
#[derive(Debug, Default, Deserialize)]
pub struct FormRequest {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<String>,
    /// JSON-encoded object.
    pub metadata: Option<String>,
}

impl From<FormRequest> for Payload {
    fn from(form: FormRequest) -> Self {
        if let Some(text) = form.text.filter(|t| !t.is_empty()) {
            return Payload::text(text);
        }
        let Some(data) = form.data.filter(|d| !d.is_empty()) else {
            return Payload::default();
        };
        let metadata = form
            .metadata
            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw).ok())
            .unwrap_or_default();
        Payload {
            kind: form.kind.filter(|k| !k.is_empty()).unwrap_or_else(default_kind),
            data,
            metadata,
        }
    }
}

/// Body POSTed to every stage.
#[derive(Debug, Serialize)]
pub struct StageRequest<'a> {
    pub payload: &'a Payload,
    pub steps: &'a [Value],
    /// Plain text convenience copy (empty for non-text payloads).
    pub text: &'a str,
}

impl<'a> StageRequest<'a> {
    pub fn new(payload: &'a Payload, steps: &'a [Value]) -> Self {
        let text = if payload.is_text() { payload.data.as_str() } else { "" };
        Self { payload, steps, text }
    }
}

/// A decoded stage reply.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReply {
    pub payload: Payload,
    /// Present when the stage rewrote the step history.
    pub steps: Option<Vec<Value>>,
}

impl StageReply {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(object) => Ok(Self::from_object(object)),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let steps = match object.remove("steps") {
            Some(Value::Array(steps)) => Some(steps),
            _ => None,
        };
        Self {
            payload: normalize_response(&object),
            steps,
        }
    }
}

/// Canonical payload from a stage reply.
///
/// A `payload` envelope is adopted as-is. Otherwise legacy fields are used in
/// priority order: `type`+`data`, then `text`, then `result`.
pub fn normalize_response(object: &Map<String, Value>) -> Payload {
    if let Some(Value::Object(envelope)) = object.get("payload") {
        return Payload::from_object(envelope);
    }

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map_or_else(default_kind, str::to_string);
    let data = ["data", "text", "result"]
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string();

    Payload {
        kind,
        data,
        metadata: metadata_of(object),
    }
}

/// One entry of the progress stream: what a stage did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub service: String,
    pub input: String,
    pub output: String,
    pub status: String,
    pub payload_type: String,
}

impl StepRecord {
    /// Describe a completed stage. `reported` is the stage's own latest
    /// history entry, when it supplied one; its fields win over previews.
    pub fn describe(service: &str, input: &Payload, output: &Payload, reported: Option<&Value>) -> Self {
        let field = |name: &str| reported.and_then(|step| step.get(name)).and_then(Value::as_str);
        Self {
            service: service.to_string(),
            input: field("input").map_or_else(|| input.preview(), truncate_preview),
            output: field("output").map_or_else(|| output.preview(), truncate_preview),
            status: field("status").unwrap_or("ok").to_string(),
            payload_type: output.kind.clone(),
        }
    }
}
