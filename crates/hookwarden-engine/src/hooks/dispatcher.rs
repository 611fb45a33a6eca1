use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{encode_request, RequestMeta};
use super::events::{Gate, HookEvent, HookEventKind};
use super::hook::{Hook, InvocationRequest, ProcessOutput};
use super::interpreter::{interpret, HookDecision, HookInvocation, Verdict};
use crate::audit::{AuditRecord, AuditSink};

/// Extra time an in-process hook gets past the configured timeout before
/// the dispatcher gives up on it. Process hooks enforce the timeout
/// themselves and finish well inside this window.
const INVOKE_GRACE: Duration = Duration::from_secs(1);

/// Task-level settings every request of the task shares
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub task_id: String,
    pub workspace_roots: Vec<PathBuf>,
    pub actor_id: String,
    pub timeout: Duration,
}

/// Blocking rejection surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub hook: String,
    pub reason: String,
}

/// Aggregated result of all hooks for one event
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event: HookEventKind,
    pub decisions: Vec<HookDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl EventOutcome {
    pub fn new(event: HookEventKind) -> Self {
        Self {
            event,
            decisions: Vec::new(),
            rejection: None,
        }
    }

    pub fn allowed(&self) -> bool {
        self.rejection.is_none()
    }

    /// Non-empty context from decisions that let the action through,
    /// in invocation order
    pub fn contexts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.decisions
            .iter()
            .filter_map(|d| d.accepted_context().map(|text| (d.hook.as_str(), text)))
    }

    pub fn faulted(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.verdict, Verdict::Faulted { .. }))
            .count()
    }
}

/// Runs the hooks resolved for an event, one after another.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<DispatchContext>,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    pub fn new(ctx: DispatchContext, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            audit,
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    /// Run the hooks on a dedicated tokio task
    pub fn spawn(&self, hooks: Arc<[Arc<dyn Hook>]>, event: HookEvent) -> JoinHandle<EventOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(&hooks, &event).await })
    }

    /// Run on a worker task and wait for the outcome. A worker that dies
    /// fails open like any other hook fault.
    pub async fn run_on_worker(&self, hooks: Arc<[Arc<dyn Hook>]>, event: HookEvent) -> EventOutcome {
        let kind = event.kind();
        match self.spawn(hooks, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(event = %kind, error = %e, "Hook worker failed, allowing");
                EventOutcome::new(kind)
            }
        }
    }

    /// Run every hook for `event` in order.
    ///
    /// All hooks receive the same request body, built once before the
    /// first runs, so nothing one hook returns can reach another hook of
    /// the same event. On a blocking event the first veto stops the chain.
    pub async fn run(&self, hooks: &[Arc<dyn Hook>], event: &HookEvent) -> EventOutcome {
        let kind = event.kind();
        let gate = kind.gate();
        let mut outcome = EventOutcome::new(kind);

        if hooks.is_empty() {
            return outcome;
        }

        let meta = RequestMeta {
            task_id: self.ctx.task_id.clone(),
            workspace_roots: self.ctx.workspace_roots.clone(),
            actor_id: self.ctx.actor_id.clone(),
            timestamp: Utc::now(),
        };
        let body = match encode_request(event, &meta) {
            Ok(body) => body,
            Err(e) => {
                error!(event = %kind, error = %e, "Could not build hook request, skipping hooks");
                return outcome;
            }
        };
        let request = InvocationRequest {
            event: kind,
            task_id: self.ctx.task_id.clone(),
            body,
            working_dir: self.ctx.workspace_roots.first().cloned(),
            timeout: self.ctx.timeout,
        };

        for hook in hooks {
            let decision = self.invoke_one(hook.as_ref(), &request, gate).await;
            let vetoed = decision.vetoed();
            if let Some(reason) = decision.rejection_reason() {
                outcome.rejection = Some(Rejection {
                    hook: decision.hook.clone(),
                    reason: reason.to_string(),
                });
            }
            outcome.decisions.push(decision);
            if vetoed {
                break;
            }
        }

        outcome
    }

    async fn invoke_one(&self, hook: &dyn Hook, request: &InvocationRequest, gate: Gate) -> HookDecision {
        let started = Instant::now();
        // A panicking hook faults like a crashed one instead of taking the
        // rest of the chain down with it.
        let invocation = AssertUnwindSafe(hook.invoke(request)).catch_unwind();
        let output = match tokio::time::timeout(request.timeout + INVOKE_GRACE, invocation).await {
            Ok(Ok(output)) => output,
            Ok(Err(_)) => {
                error!(hook = hook.name(), event = %request.event, "Hook panicked");
                ProcessOutput::failed("hook panicked")
            }
            Err(_) => ProcessOutput::timed_out(),
        };
        let duration = started.elapsed();

        let (invocation_outcome, decision) = interpret(hook.name(), hook.scope(), &output, gate);

        match &decision.verdict {
            Verdict::Allowed if decision.veto_ignored => warn!(
                hook = hook.name(),
                event = %request.event,
                "Hook returned a veto for an event that cannot be vetoed, ignoring"
            ),
            Verdict::Allowed => debug!(
                hook = hook.name(),
                event = %request.event,
                duration_ms = duration.as_millis() as u64,
                "Hook allowed"
            ),
            Verdict::Denied { reason } => info!(
                hook = hook.name(),
                event = %request.event,
                reason = %reason,
                "Hook vetoed operation"
            ),
            Verdict::Faulted { fault } => warn!(
                hook = hook.name(),
                event = %request.event,
                fault = %fault,
                exit_code = ?output.exit_code,
                "Hook faulted, failing open"
            ),
        }

        if !output.stderr.is_empty() {
            debug!(hook = hook.name(), stderr = %output.stderr, "Hook diagnostics");
            self.audit.record(AuditRecord::Diagnostic {
                timestamp: Utc::now(),
                task_id: self.ctx.task_id.clone(),
                hook: hook.name().to_string(),
                event: request.event,
                text: output.stderr.clone(),
            });
        }

        self.audit.record(AuditRecord::Invocation {
            timestamp: Utc::now(),
            task_id: self.ctx.task_id.clone(),
            invocation: HookInvocation::new(
                hook.name(),
                hook.scope(),
                request.event,
                &request.body,
                output,
                duration,
                invocation_outcome,
            ),
            verdict: decision.verdict.clone(),
        });

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::hooks::events::{PostToolUse, PreToolUse};
    use crate::hooks::HookScope;
    use crate::hooks::interpreter::{Fault, InvocationOutcome};
    use crate::testing::FakeHook;

    fn dispatcher(audit: Arc<MemoryAuditLog>) -> Dispatcher {
        Dispatcher::new(
            DispatchContext {
                task_id: "task-1".into(),
                workspace_roots: vec![PathBuf::from("/work")],
                actor_id: "tester".into(),
                timeout: Duration::from_millis(200),
            },
            audit,
        )
    }

    fn pre_tool_use() -> HookEvent {
        HookEvent::PreToolUse(PreToolUse {
            tool_name: "shell".into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_no_hooks_allows() {
        let audit = Arc::new(MemoryAuditLog::new());
        let outcome = dispatcher(audit.clone()).run(&[], &pre_tool_use()).await;
        assert!(outcome.allowed());
        assert!(outcome.decisions.is_empty());
        assert!(audit.records().is_empty());
    }

    #[tokio::test]
    async fn test_veto_short_circuits_chain() {
        let first = Arc::new(FakeHook::allow("first"));
        let blocker = Arc::new(FakeHook::deny("blocker", "no shell"));
        let last = Arc::new(FakeHook::allow("last"));
        let hooks: Vec<Arc<dyn Hook>> = vec![first.clone(), blocker.clone(), last.clone()];

        let outcome = dispatcher(Arc::new(MemoryAuditLog::new()))
            .run(&hooks, &pre_tool_use())
            .await;

        assert!(!outcome.allowed());
        assert_eq!(
            outcome.rejection,
            Some(Rejection {
                hook: "blocker".into(),
                reason: "no shell".into()
            })
        );
        assert_eq!(first.calls(), 1);
        assert_eq!(blocker.calls(), 1);
        assert_eq!(last.calls(), 0);
    }

    #[tokio::test]
    async fn test_advisory_veto_has_no_effect() {
        let blocker = Arc::new(FakeHook::deny("blocker", "ignored"));
        let after = Arc::new(FakeHook::allow("after"));
        let hooks: Vec<Arc<dyn Hook>> = vec![blocker.clone(), after.clone()];

        let event = HookEvent::PostToolUse(PostToolUse::default());
        let outcome = dispatcher(Arc::new(MemoryAuditLog::new()))
            .run(&hooks, &event)
            .await;

        assert!(outcome.allowed());
        assert!(outcome.decisions[0].veto_ignored);
        assert_eq!(after.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_event_hooks_share_one_request() {
        let first = Arc::new(FakeHook::allow("first").with_context("X marks the spot"));
        let second = Arc::new(FakeHook::allow("second"));
        let hooks: Vec<Arc<dyn Hook>> = vec![first.clone(), second.clone()];

        let outcome = dispatcher(Arc::new(MemoryAuditLog::new()))
            .run(&hooks, &pre_tool_use())
            .await;

        assert_eq!(
            outcome.contexts().collect::<Vec<_>>(),
            [("first", "X marks the spot")]
        );
        let seen = second.requests();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].contains("X marks the spot"));
        assert_eq!(first.requests(), seen);
    }

    #[tokio::test]
    async fn test_slow_in_process_hook_times_out_open() {
        let slow = Arc::new(FakeHook::deny("slow", "too late").with_delay(Duration::from_secs(30)));
        let hooks: Vec<Arc<dyn Hook>> = vec![slow];

        let started = Instant::now();
        let outcome = dispatcher(Arc::new(MemoryAuditLog::new()))
            .run(&hooks, &pre_tool_use())
            .await;

        assert!(outcome.allowed());
        assert_eq!(outcome.faulted(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_audit_records_invocation_and_diagnostics() {
        let audit = Arc::new(MemoryAuditLog::new());
        let noisy = Arc::new(
            FakeHook::raw("noisy", r#"{"cancel": false}"#)
                .with_stderr("Traceback (most recent call last):\n  boom")
                .with_exit_code(1)
                .in_scope(HookScope::User),
        );
        let hooks: Vec<Arc<dyn Hook>> = vec![noisy];

        let outcome = dispatcher(audit.clone()).run(&hooks, &pre_tool_use()).await;
        assert!(outcome.allowed());
        assert_eq!(outcome.faulted(), 0);

        let records = audit.records();
        assert_eq!(records.len(), 2);
        match &records[0] {
            AuditRecord::Diagnostic { text, hook, .. } => {
                assert_eq!(hook, "noisy");
                assert_eq!(text, "Traceback (most recent call last):\n  boom");
            }
            other => panic!("expected diagnostic, got {other:?}"),
        }
        match &records[1] {
            AuditRecord::Invocation { invocation, verdict, .. } => {
                assert_eq!(invocation.exit_code, Some(1));
                assert_eq!(*verdict, Verdict::Allowed);
            }
            other => panic!("expected invocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_open() {
        let audit = Arc::new(MemoryAuditLog::new());
        let hooks: Vec<Arc<dyn Hook>> = vec![
            Arc::new(FakeHook::allow("a").with_context("X")),
            Arc::new(FakeHook::panicking("b")),
        ];
        let outcome = dispatcher(audit.clone())
            .run_on_worker(Arc::from(hooks), pre_tool_use())
            .await;

        assert!(outcome.allowed());
        assert_eq!(outcome.contexts().collect::<Vec<_>>(), vec![("a", "X")]);
        assert_eq!(outcome.decisions.len(), 2);
        assert_eq!(
            outcome.decisions[1].verdict,
            Verdict::Faulted {
                fault: Fault::Crashed {
                    reason: "hook panicked".into()
                }
            }
        );

        let crashed = audit.records().into_iter().any(|record| {
            matches!(
                record,
                AuditRecord::Invocation { invocation, verdict: Verdict::Faulted { .. }, .. }
                    if invocation.hook == "b"
                        && invocation.outcome == InvocationOutcome::Crashed
            )
        });
        assert!(crashed);
    }
}
