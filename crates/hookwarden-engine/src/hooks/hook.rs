use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::codec::ProtocolError;
use super::events::HookEventKind;

/// Precedence tier a hook was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookScope {
    /// User-global hook directory
    User,
    /// Hook directory inside a workspace root
    Project,
}

impl std::fmt::Display for HookScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookScope::User => f.write_str("user"),
            HookScope::Project => f.write_str("project"),
        }
    }
}

/// One resolved hook executable. Immutable for the lifetime of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    /// Absolute path to the executable
    pub path: PathBuf,
    pub scope: HookScope,
    pub event: HookEventKind,
}

/// Everything a hook needs to answer one event.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub event: HookEventKind,
    pub task_id: String,
    /// Serialized request envelope, written verbatim to the hook
    pub body: String,
    /// Working directory for process-backed hooks
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

/// How a hook run ended, before its output is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The hook exited on its own (with any exit code)
    Exited,
    /// The hook overran its timeout and was killed
    TimedOut,
    /// The hook could not be run to completion (spawn or wait failure)
    Failed(String),
}

/// Raw result of one hook run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Protocol channel
    pub stdout: String,
    /// Set when stdout cannot be decoded as captured (over the size limit
    /// or not UTF-8). `stdout` then holds a lossy copy for audit only.
    pub stdout_fault: Option<ProtocolError>,
    /// Diagnostic channel, never parsed
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub termination: Termination,
}

impl ProcessOutput {
    pub fn exited(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stdout_fault: None,
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            termination: Termination::Exited,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stdout_fault: None,
            stderr: String::new(),
            exit_code: None,
            termination: Termination::TimedOut,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stdout_fault: None,
            stderr: String::new(),
            exit_code: None,
            termination: Termination::Failed(reason.into()),
        }
    }
}

/// A black-box `decide(event)` capability.
///
/// Implemented by [`ProcessHook`](super::invoker::ProcessHook) for external
/// executables and by in-memory fakes in tests.
/// Implementations report failures through [`Termination`] instead of
/// returning errors: every run must end in an output the interpreter can
/// turn into a decision.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Hook name for logging and audit
    fn name(&self) -> &str;

    fn scope(&self) -> HookScope;

    /// Run the hook against one serialized request
    async fn invoke(&self, request: &InvocationRequest) -> ProcessOutput;
}
