use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle events a hook can be attached to.
///
/// The canonical name (`as_str`) is also the exact file name a hook
/// executable must carry to be picked up for the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookEventKind {
    /// Task started by the user
    TaskStart,
    /// Suspended or restored task resumed
    TaskResume,
    /// Task cancelled (cannot be vetoed)
    TaskCancel,
    /// Task finished normally
    TaskComplete,
    /// Before a tool runs; the only blocking event
    PreToolUse,
    /// After a tool ran
    PostToolUse,
    /// User submitted input to the task
    UserPromptSubmit,
}

/// Whether an event may hold up the action it accompanies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    /// The action waits for the aggregated decision and honors vetoes
    Blocking,
    /// Hooks observe and contribute context; vetoes are ignored
    Advisory,
}

impl HookEventKind {
    pub const ALL: [HookEventKind; 7] = [
        HookEventKind::TaskStart,
        HookEventKind::TaskResume,
        HookEventKind::TaskCancel,
        HookEventKind::TaskComplete,
        HookEventKind::PreToolUse,
        HookEventKind::PostToolUse,
        HookEventKind::UserPromptSubmit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEventKind::TaskStart => "TaskStart",
            HookEventKind::TaskResume => "TaskResume",
            HookEventKind::TaskCancel => "TaskCancel",
            HookEventKind::TaskComplete => "TaskComplete",
            HookEventKind::PreToolUse => "PreToolUse",
            HookEventKind::PostToolUse => "PostToolUse",
            HookEventKind::UserPromptSubmit => "UserPromptSubmit",
        }
    }

    /// Exact, case-sensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn gate(&self) -> Gate {
        match self {
            HookEventKind::PreToolUse => Gate::Blocking,
            _ => Gate::Advisory,
        }
    }
}

impl fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown hook event '{0}' (expected one of TaskStart, TaskResume, TaskCancel, TaskComplete, PreToolUse, PostToolUse, UserPromptSubmit)")]
pub struct UnknownEvent(pub String);

impl FromStr for HookEventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

impl Serialize for HookEventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Task identity shared by the task-level payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskMetadata {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStart {
    pub task_metadata: TaskMetadata,
}

/// Markers describing the session a resumed task picks up from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviousState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_ts: Option<String>,
    pub message_count: u64,
    pub conversation_history_deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskResume {
    pub task_metadata: TaskMetadata,
    pub previous_state: PreviousState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskCancel {
    pub task_metadata: TaskMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskComplete {
    pub task_metadata: TaskMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreToolUse {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostToolUse {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
    pub result: String,
    pub success: bool,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPromptSubmit {
    pub prompt: String,
    pub attachments: Vec<String>,
}

/// An event and its payload.
///
/// Serializes externally tagged, so the payload lands under a key named
/// for the event (`{"preToolUse": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HookEvent {
    TaskStart(TaskStart),
    TaskResume(TaskResume),
    TaskCancel(TaskCancel),
    TaskComplete(TaskComplete),
    PreToolUse(PreToolUse),
    PostToolUse(PostToolUse),
    UserPromptSubmit(UserPromptSubmit),
}

impl HookEvent {
    pub fn kind(&self) -> HookEventKind {
        match self {
            HookEvent::TaskStart(_) => HookEventKind::TaskStart,
            HookEvent::TaskResume(_) => HookEventKind::TaskResume,
            HookEvent::TaskCancel(_) => HookEventKind::TaskCancel,
            HookEvent::TaskComplete(_) => HookEventKind::TaskComplete,
            HookEvent::PreToolUse(_) => HookEventKind::PreToolUse,
            HookEvent::PostToolUse(_) => HookEventKind::PostToolUse,
            HookEvent::UserPromptSubmit(_) => HookEventKind::UserPromptSubmit,
        }
    }

    /// Build an event from the JSON of its nested payload object.
    /// `null` yields the payload's defaults.
    pub fn from_payload(kind: HookEventKind, payload: Value) -> serde_json::Result<Self> {
        let payload = if payload.is_null() {
            Value::Object(Map::new())
        } else {
            payload
        };
        Ok(match kind {
            HookEventKind::TaskStart => HookEvent::TaskStart(serde_json::from_value(payload)?),
            HookEventKind::TaskResume => HookEvent::TaskResume(serde_json::from_value(payload)?),
            HookEventKind::TaskCancel => HookEvent::TaskCancel(serde_json::from_value(payload)?),
            HookEventKind::TaskComplete => {
                HookEvent::TaskComplete(serde_json::from_value(payload)?)
            }
            HookEventKind::PreToolUse => HookEvent::PreToolUse(serde_json::from_value(payload)?),
            HookEventKind::PostToolUse => HookEvent::PostToolUse(serde_json::from_value(payload)?),
            HookEventKind::UserPromptSubmit => {
                HookEvent::UserPromptSubmit(serde_json::from_value(payload)?)
            }
        })
    }
}
