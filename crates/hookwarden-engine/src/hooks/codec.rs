//! Wire format between the engine and hook processes.
//!
//! Requests are one JSON object: a common envelope plus the event payload
//! nested under a key named for the event. Responses must be exactly one
//! JSON object; anything else is a [`ProtocolError`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::HookEvent;

/// Protocol revision sent with every request
pub const PROTOCOL_VERSION: &str = "1";

/// Envelope fields shared by every request of one task
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub task_id: String,
    pub workspace_roots: Vec<PathBuf>,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    protocol_version: &'static str,
    hook_name: &'static str,
    timestamp: String,
    task_id: &'a str,
    workspace_roots: Vec<String>,
    user_id: &'a str,
    #[serde(flatten)]
    event: &'a HookEvent,
}

/// Serialize an event into the request body written to a hook's stdin
pub fn encode_request(event: &HookEvent, meta: &RequestMeta) -> Result<String> {
    let request = WireRequest {
        protocol_version: PROTOCOL_VERSION,
        hook_name: event.kind().as_str(),
        timestamp: meta.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        task_id: &meta.task_id,
        workspace_roots: meta
            .workspace_roots
            .iter()
            .map(|root| root.display().to_string())
            .collect(),
        user_id: &meta.actor_id,
        event,
    };
    serde_json::to_string(&request)
        .with_context(|| format!("Failed to encode {} request", event.kind()))
}

/// Decoded hook response.
///
/// Also the type hook authors build their answer with (see `hookwarden-sdk`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    /// Veto flag
    #[serde(default)]
    pub cancel: bool,
    /// Guidance for the next model-facing turn
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_modification: String,
    /// Rejection reason, surfaced to the user when `cancel` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl HookResponse {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            cancel: true,
            error_message: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_modification = context.into();
        self
    }
}

/// Why a hook's output could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("hook produced no output")]
    Empty,
    #[error("output exceeded limit of {limit} bytes")]
    OutputTooLarge { limit: usize },
    #[error("output is not valid UTF-8")]
    InvalidUtf8,
    #[error("output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("output contains more than one JSON value")]
    MultipleValues,
    #[error("field '{field}' must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Decode a hook's stdout into a response.
///
/// Surrounding whitespace is ignored. Missing fields take their defaults;
/// a `null` field counts as missing. Unknown fields are ignored.
pub fn decode_response(stdout: &str) -> Result<HookResponse, ProtocolError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let mut values = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
    let first = match values.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(ProtocolError::InvalidJson(e.to_string())),
        None => return Err(ProtocolError::Empty),
    };
    match values.next() {
        None => {}
        Some(Ok(_)) => return Err(ProtocolError::MultipleValues),
        Some(Err(e)) => return Err(ProtocolError::InvalidJson(e.to_string())),
    }

    let Value::Object(fields) = first else {
        return Err(ProtocolError::NotAnObject(json_type(&first)));
    };

    let cancel = match fields.get("cancel") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ProtocolError::WrongType {
                field: "cancel",
                expected: "boolean",
            })
        }
    };

    Ok(HookResponse {
        cancel,
        context_modification: string_field(&fields, "contextModification")?.unwrap_or_default(),
        error_message: string_field(&fields, "errorMessage")?,
    })
}

fn string_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ProtocolError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ProtocolError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
