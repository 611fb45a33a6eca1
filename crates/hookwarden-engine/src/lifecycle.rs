//! Per-task lifecycle state machine.
//!
//! The controller emits hook events at each transition, waits on the
//! blocking pre-tool gate, and folds hook context into the task's buffer.
//! Advisory events run on worker tasks; their outcomes are folded in
//! dispatch order before the next model-facing turn reads the buffer.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink};
use crate::config::EngineConfig;
use crate::context::{render_entries, AppendOutcome, ContextAccumulator, ContextEntry};
use crate::hooks::{
    DispatchContext, Dispatcher, EventOutcome, HookEvent, HookEventKind, HookRegistry,
    PostToolUse, PreToolUse, PreviousState, ResolvedHooks, TaskCancel, TaskComplete,
    TaskMetadata, TaskResume, TaskStart, UserPromptSubmit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, no event fired yet
    Idle,
    Active,
    /// Waiting at or past the pre-tool gate
    ToolGate,
    Suspended,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Active => "active",
            TaskState::ToolGate => "tool_gate",
            TaskState::Suspended => "suspended",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {operation} while task is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: TaskState,
    },
}

/// Result of the pre-tool gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// A hook vetoed the tool; `reason` is meant for the user
    Blocked { hook: String, reason: String },
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Blocked { .. })
    }
}

/// What happened to a tool submitted through [`TaskController::run_tool`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRun {
    Blocked {
        hook: String,
        reason: String,
    },
    Completed {
        result: String,
        success: bool,
        elapsed: Duration,
    },
}

/// Context handed to one model-facing request
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub entries: Vec<ContextEntry>,
}

impl ModelTurn {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        render_entries(&self.entries)
    }
}

enum Pending {
    Settled(EventOutcome),
    Running(HookEventKind, JoinHandle<EventOutcome>),
}

/// Drives one task through its lifecycle.
pub struct TaskController {
    id: String,
    workspace_roots: Vec<PathBuf>,
    created_at: DateTime<Utc>,
    state: TaskState,
    initial_task: Option<String>,
    registry: Arc<HookRegistry>,
    hooks: ResolvedHooks,
    dispatcher: Dispatcher,
    context: ContextAccumulator,
    pending: VecDeque<Pending>,
    audit: Arc<dyn AuditSink>,
}

impl TaskController {
    pub fn new(
        registry: Arc<HookRegistry>,
        config: &EngineConfig,
        workspace_roots: Vec<PathBuf>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let dispatcher = Dispatcher::new(
            DispatchContext {
                task_id: id.clone(),
                workspace_roots: workspace_roots.clone(),
                actor_id: config.actor_id.clone(),
                timeout: config.timeout(),
            },
            audit.clone(),
        );
        Self {
            id,
            workspace_roots,
            created_at: Utc::now(),
            state: TaskState::Idle,
            initial_task: None,
            registry,
            hooks: ResolvedHooks::default(),
            dispatcher,
            context: ContextAccumulator::new(config.context.max_bytes),
            pending: VecDeque::new(),
            audit,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn workspace_roots(&self) -> &[PathBuf] {
        &self.workspace_roots
    }

    /// Hooks resolved when the task started or was first resumed
    pub fn hooks(&self) -> &ResolvedHooks {
        &self.hooks
    }

    pub fn context(&self) -> &ContextAccumulator {
        &self.context
    }

    /// Start the task. TaskStart hooks finish before this returns.
    pub async fn start(
        &mut self,
        initial_task: Option<String>,
    ) -> Result<EventOutcome, LifecycleError> {
        self.expect_state("start", &[TaskState::Idle])?;
        self.hooks = self.registry.resolve(&self.workspace_roots);
        self.initial_task = initial_task;
        self.transition(TaskState::Active);

        let event = HookEvent::TaskStart(TaskStart {
            task_metadata: self.metadata(None),
        });
        Ok(self.dispatch_and_wait(event).await)
    }

    /// Resume a suspended task, or a restored one that has not started in
    /// this process. The context buffer carries over.
    pub async fn resume(
        &mut self,
        previous_state: PreviousState,
    ) -> Result<EventOutcome, LifecycleError> {
        self.expect_state("resume", &[TaskState::Idle, TaskState::Suspended])?;
        if self.state == TaskState::Idle {
            self.hooks = self.registry.resolve(&self.workspace_roots);
        }
        self.transition(TaskState::Active);

        let event = HookEvent::TaskResume(TaskResume {
            task_metadata: self.metadata(None),
            previous_state,
        });
        Ok(self.dispatch_and_wait(event).await)
    }

    pub fn suspend(&mut self) -> Result<(), LifecycleError> {
        self.expect_state("suspend", &[TaskState::Active])?;
        self.transition(TaskState::Suspended);
        Ok(())
    }

    /// Fire UserPromptSubmit without waiting for its hooks
    pub fn submit_user_input(
        &mut self,
        prompt: &str,
        attachments: Vec<String>,
    ) -> Result<(), LifecycleError> {
        self.expect_state("submit user input", &[TaskState::Active])?;
        self.dispatch_in_background(HookEvent::UserPromptSubmit(UserPromptSubmit {
            prompt: prompt.to_string(),
            attachments,
        }));
        Ok(())
    }

    /// Gate a tool call on the PreToolUse hooks.
    ///
    /// On `Proceed` the task stays at the gate until
    /// [`post_tool_use`](Self::post_tool_use). A blocked call returns the
    /// task to active and no PostToolUse is expected.
    pub async fn pre_tool_use(
        &mut self,
        tool_name: &str,
        parameters: Map<String, Value>,
    ) -> Result<GateDecision, LifecycleError> {
        self.expect_state("gate a tool", &[TaskState::Active])?;
        self.transition(TaskState::ToolGate);

        let outcome = self
            .dispatch_and_wait(HookEvent::PreToolUse(PreToolUse {
                tool_name: tool_name.to_string(),
                parameters,
            }))
            .await;

        match outcome.rejection {
            Some(rejection) => {
                info!(
                    task_id = %self.id,
                    tool = tool_name,
                    hook = %rejection.hook,
                    "Tool call blocked by hook"
                );
                self.transition(TaskState::Active);
                Ok(GateDecision::Blocked {
                    hook: rejection.hook,
                    reason: rejection.reason,
                })
            }
            None => Ok(GateDecision::Proceed),
        }
    }

    /// Report a finished tool call; PostToolUse hooks run in the background
    pub fn post_tool_use(
        &mut self,
        tool_name: &str,
        parameters: Map<String, Value>,
        result: &str,
        success: bool,
        elapsed: Duration,
    ) -> Result<(), LifecycleError> {
        self.expect_state("report a tool result", &[TaskState::ToolGate])?;
        self.transition(TaskState::Active);
        self.dispatch_in_background(HookEvent::PostToolUse(PostToolUse {
            tool_name: tool_name.to_string(),
            parameters,
            result: result.to_string(),
            success,
            execution_time_ms: elapsed.as_millis() as u64,
        }));
        Ok(())
    }

    /// Gate, run and report one tool call. `action` only runs if no hook
    /// vetoes it; an `Err` from it is reported as an unsuccessful result.
    pub async fn run_tool<F, Fut>(
        &mut self,
        tool_name: &str,
        parameters: Map<String, Value>,
        action: F,
    ) -> Result<ToolRun, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        if let GateDecision::Blocked { hook, reason } =
            self.pre_tool_use(tool_name, parameters.clone()).await?
        {
            return Ok(ToolRun::Blocked { hook, reason });
        }

        let started = Instant::now();
        let (result, success) = match action().await {
            Ok(output) => (output, true),
            Err(e) => (format!("{:#}", e), false),
        };
        let elapsed = started.elapsed();

        self.post_tool_use(tool_name, parameters, &result, success, elapsed)?;
        Ok(ToolRun::Completed {
            result,
            success,
            elapsed,
        })
    }

    /// Collect the context to send with the next model-facing request.
    ///
    /// Waits for outstanding background events, folds their context in
    /// dispatch order, and returns what was appended since the previous turn.
    pub async fn begin_model_turn(&mut self) -> Result<ModelTurn, LifecycleError> {
        self.expect_state("begin a model turn", &[TaskState::Active])?;
        self.settle_pending().await;
        Ok(ModelTurn {
            entries: self.context.take_unread(),
        })
    }

    /// Finish the task. TaskComplete hooks run detached; the returned
    /// handle may be awaited or dropped.
    pub fn complete(
        &mut self,
        completion_status: Option<String>,
    ) -> Result<JoinHandle<EventOutcome>, LifecycleError> {
        self.expect_state("complete", &[TaskState::Active, TaskState::Suspended])?;
        self.retire(TaskState::Completed);
        let event = HookEvent::TaskComplete(TaskComplete {
            task_metadata: self.metadata(completion_status),
        });
        Ok(self.dispatch_detached(event))
    }

    /// Cancel the task from any live state. TaskCancel always fires and
    /// its hooks cannot veto.
    pub fn cancel(&mut self) -> Result<JoinHandle<EventOutcome>, LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                operation: "cancel",
                state: self.state,
            });
        }
        self.retire(TaskState::Cancelled);
        let event = HookEvent::TaskCancel(TaskCancel {
            task_metadata: self.metadata(None),
        });
        Ok(self.dispatch_detached(event))
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[TaskState],
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: TaskState) {
        let from = self.state;
        self.state = to;
        debug!(task_id = %self.id, %from, %to, "Task state changed");
        self.audit.record(AuditRecord::Transition {
            timestamp: Utc::now(),
            task_id: self.id.clone(),
            from,
            to,
        });
    }

    fn retire(&mut self, to: TaskState) {
        self.transition(to);
        // Background events still in flight finish on their own
        self.pending.clear();
        self.context.clear();
    }

    fn metadata(&self, completion_status: Option<String>) -> TaskMetadata {
        TaskMetadata {
            task_id: self.id.clone(),
            initial_task: self.initial_task.clone(),
            completion_status,
        }
    }

    async fn dispatch_and_wait(&mut self, event: HookEvent) -> EventOutcome {
        let kind = event.kind();
        if !self.hooks.has_hooks(kind) {
            return EventOutcome::new(kind);
        }
        let outcome = self
            .dispatcher
            .run_on_worker(self.hooks.for_event(kind), event)
            .await;
        self.pending.push_back(Pending::Settled(outcome.clone()));
        outcome
    }

    fn dispatch_in_background(&mut self, event: HookEvent) {
        let kind = event.kind();
        if !self.hooks.has_hooks(kind) {
            return;
        }
        let handle = self.dispatcher.spawn(self.hooks.for_event(kind), event);
        self.pending.push_back(Pending::Running(kind, handle));
    }

    fn dispatch_detached(&self, event: HookEvent) -> JoinHandle<EventOutcome> {
        let kind = event.kind();
        let hooks = self.hooks.for_event(kind);
        self.dispatcher.spawn(hooks, event)
    }

    async fn settle_pending(&mut self) {
        while let Some(pending) = self.pending.pop_front() {
            let outcome = match pending {
                Pending::Settled(outcome) => outcome,
                Pending::Running(kind, handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(task_id = %self.id, event = %kind, error = %e, "Hook worker failed, no context folded");
                        continue;
                    }
                },
            };
            self.fold(&outcome);
        }
    }

    fn fold(&mut self, outcome: &EventOutcome) {
        for (hook, text) in outcome.contexts() {
            let entry = ContextEntry {
                source: hook.to_string(),
                event: outcome.event,
                text: text.to_string(),
            };
            if let AppendOutcome::Dropped {
                first_overflow: true,
            } = self.context.append(entry)
            {
                self.audit.record(AuditRecord::ContextOverflow {
                    timestamp: Utc::now(),
                    task_id: self.id.clone(),
                    hook: hook.to_string(),
                    event: outcome.event,
                });
            }
        }
    }
}
