//! hookwarden hook SDK
//!
//! Helpers for writing hook executables in Rust. A hook reads one request
//! from stdin, writes one response to stdout, and logs anything else to
//! stderr:
//!
//! ```no_run
//! use hookwarden_sdk::{run, HookRequest, HookResponse};
//!
//! fn main() -> anyhow::Result<()> {
//!     run(|request: &HookRequest| {
//!         match request.pre_tool_use.as_ref() {
//!             Some(call) if call.tool_name == "shell" => Ok(HookResponse::deny("no shell here")),
//!             _ => Ok(HookResponse::allow()),
//!         }
//!     })
//! }
//! ```

use std::io::{self, Read, Write};

use serde::Deserialize;
use serde_json::{Map, Value};

pub use anyhow::Result;
pub use hookwarden_engine::hooks::{
    HookEvent, HookEventKind, HookResponse, PostToolUse, PreToolUse, PreviousState, TaskCancel,
    TaskComplete, TaskMetadata, TaskResume, TaskStart, UserPromptSubmit, PROTOCOL_VERSION,
};

/// Request envelope as a hook receives it.
///
/// Only the payload matching `hook_name` is set. Fields this SDK version
/// does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookRequest {
    pub protocol_version: String,
    pub hook_name: String,
    pub timestamp: String,
    pub task_id: String,
    pub workspace_roots: Vec<String>,
    pub user_id: String,
    pub task_start: Option<TaskStart>,
    pub task_resume: Option<TaskResume>,
    pub task_cancel: Option<TaskCancel>,
    pub task_complete: Option<TaskComplete>,
    pub pre_tool_use: Option<PreToolUse>,
    pub post_tool_use: Option<PostToolUse>,
    pub user_prompt_submit: Option<UserPromptSubmit>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookRequest {
    pub fn event_kind(&self) -> Option<HookEventKind> {
        HookEventKind::from_name(&self.hook_name)
    }

    /// The typed event, if the name is known and its payload present
    pub fn event(&self) -> Option<HookEvent> {
        let event = match self.event_kind()? {
            HookEventKind::TaskStart => HookEvent::TaskStart(self.task_start.clone()?),
            HookEventKind::TaskResume => HookEvent::TaskResume(self.task_resume.clone()?),
            HookEventKind::TaskCancel => HookEvent::TaskCancel(self.task_cancel.clone()?),
            HookEventKind::TaskComplete => HookEvent::TaskComplete(self.task_complete.clone()?),
            HookEventKind::PreToolUse => HookEvent::PreToolUse(self.pre_tool_use.clone()?),
            HookEventKind::PostToolUse => HookEvent::PostToolUse(self.post_tool_use.clone()?),
            HookEventKind::UserPromptSubmit => {
                HookEvent::UserPromptSubmit(self.user_prompt_submit.clone()?)
            }
        };
        Some(event)
    }

    /// Whether the engine speaks the same protocol revision
    pub fn is_supported_protocol(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),
    #[error("request is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to write response: {0}")]
    Write(#[source] io::Error),
}

pub fn read_request_from_reader<R: Read>(mut reader: R) -> std::result::Result<HookRequest, SdkError> {
    let mut input = String::new();
    reader.read_to_string(&mut input).map_err(SdkError::Read)?;
    Ok(serde_json::from_str(&input)?)
}

pub fn read_request_from_stdin() -> std::result::Result<HookRequest, SdkError> {
    read_request_from_reader(io::stdin().lock())
}

/// Write the response as a single JSON line
pub fn write_response_to_writer<W: Write>(
    mut writer: W,
    response: &HookResponse,
) -> std::result::Result<(), SdkError> {
    let json = serde_json::to_string(response)?;
    writeln!(writer, "{}", json).map_err(SdkError::Write)?;
    writer.flush().map_err(SdkError::Write)
}

pub fn write_response_to_stdout(response: &HookResponse) -> std::result::Result<(), SdkError> {
    write_response_to_writer(io::stdout().lock(), response)
}

/// Read a request from stdin, answer it with `handler`, print the response.
///
/// A request that cannot be read, or a handler error, is reported on
/// stderr and answered with an allow.
pub fn run<F>(handler: F) -> Result<()>
where
    F: FnOnce(&HookRequest) -> Result<HookResponse>,
{
    run_with(io::stdin().lock(), io::stdout().lock(), io::stderr().lock(), handler)
}

/// [`run`] over explicit streams
pub fn run_with<R, W, E, F>(input: R, output: W, mut diagnostics: E, handler: F) -> Result<()>
where
    R: Read,
    W: Write,
    E: Write,
    F: FnOnce(&HookRequest) -> Result<HookResponse>,
{
    let response = match read_request_from_reader(input) {
        Ok(request) => handler(&request).unwrap_or_else(|e| {
            let _ = writeln!(diagnostics, "hook handler failed: {:#}", e);
            HookResponse::allow()
        }),
        Err(e) => {
            let _ = writeln!(diagnostics, "{}", e);
            HookResponse::allow()
        }
    };
    write_response_to_writer(output, &response)?;
    Ok(())
}
