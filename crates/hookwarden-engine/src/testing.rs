//! In-memory hooks for exercising the engine without spawning processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::hooks::{Hook, HookResponse, HookScope, InvocationRequest, ProcessOutput};

#[derive(Debug, Clone)]
enum Behavior {
    Reply,
    Crash(String),
    Panic,
}

/// Scripted [`Hook`] that records every request it receives
pub struct FakeHook {
    name: String,
    scope: HookScope,
    stdout: String,
    stderr: String,
    exit_code: i32,
    delay: Option<Duration>,
    behavior: Behavior,
    requests: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeHook {
    fn with_stdout(name: &str, stdout: String) -> Self {
        Self {
            name: name.to_string(),
            scope: HookScope::Project,
            stdout,
            stderr: String::new(),
            exit_code: 0,
            delay: None,
            behavior: Behavior::Reply,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn respond(name: &str, response: &HookResponse) -> Self {
        let stdout = serde_json::to_string(response).unwrap_or_default();
        Self::with_stdout(name, stdout)
    }

    pub fn allow(name: &str) -> Self {
        Self::respond(name, &HookResponse::allow())
    }

    pub fn deny(name: &str, reason: &str) -> Self {
        Self::respond(name, &HookResponse::deny(reason))
    }

    /// Reply with arbitrary stdout
    pub fn raw(name: &str, stdout: &str) -> Self {
        Self::with_stdout(name, stdout.to_string())
    }

    /// Fail to run, as a hook that cannot be spawned would
    pub fn crash(name: &str, reason: &str) -> Self {
        let mut hook = Self::with_stdout(name, String::new());
        hook.behavior = Behavior::Crash(reason.to_string());
        hook
    }

    /// Panic inside `invoke`
    pub fn panicking(name: &str) -> Self {
        let mut hook = Self::with_stdout(name, String::new());
        hook.behavior = Behavior::Panic;
        hook
    }

    /// Attach context to the reply. Only meaningful for JSON replies.
    pub fn with_context(mut self, context: &str) -> Self {
        if let Ok(mut response) = serde_json::from_str::<HookResponse>(&self.stdout) {
            response.context_modification = context.to_string();
            self.stdout = serde_json::to_string(&response).unwrap_or_default();
        }
        self
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn in_scope(mut self, scope: HookScope) -> Self {
        self.scope = scope;
        self
    }

    /// Request bodies seen so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Hook for FakeHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> HookScope {
        self.scope
    }

    async fn invoke(&self, request: &InvocationRequest) -> ProcessOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.body.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Reply => {
                ProcessOutput::exited(self.stdout.clone(), self.stderr.clone(), self.exit_code)
            }
            Behavior::Crash(reason) => ProcessOutput::failed(reason.clone()),
            Behavior::Panic => panic!("fake hook '{}' panicked", self.name),
        }
    }
}
