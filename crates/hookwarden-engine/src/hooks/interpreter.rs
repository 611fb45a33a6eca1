//! Turns one raw hook run into a decision.
//!
//! An invocation is pending while the hook runs and then settles into
//! exactly one [`Verdict`]. Only a well-formed response with the veto flag
//! set on a blocking event is `Denied`. Every failure is `Faulted`, which
//! lets the action proceed like `Allowed` but stays distinguishable in logs
//! and the audit trail.

use std::time::Duration;

use serde::Serialize;

use super::codec::decode_response;
use super::events::{Gate, HookEventKind};
use super::hook::{HookScope, ProcessOutput, Termination};

/// Why an invocation could not produce a usable answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    TimedOut,
    Crashed { reason: String },
    MalformedOutput { reason: String },
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::TimedOut => f.write_str("timed out"),
            Fault::Crashed { reason } => write!(f, "crashed: {}", reason),
            Fault::MalformedOutput { reason } => write!(f, "malformed output: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Denied { reason: String },
    Faulted { fault: Fault },
}

impl Verdict {
    /// Faulted fails open: only Denied stops the action.
    pub fn lets_action_proceed(&self) -> bool {
        !matches!(self, Verdict::Denied { .. })
    }
}

/// Interpreted result of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookDecision {
    pub hook: String,
    pub scope: HookScope,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Context contributed for the next model-facing turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// An advisory event answered with a veto, which was ignored
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub veto_ignored: bool,
}

impl HookDecision {
    pub fn vetoed(&self) -> bool {
        !self.verdict.lets_action_proceed()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Denied { reason } => Some(reason),
            _ => None,
        }
    }

    /// Context to fold into the task, if this decision contributes any.
    /// Denied decisions never contribute.
    pub fn accepted_context(&self) -> Option<&str> {
        match self.verdict {
            Verdict::Denied { .. } => None,
            _ => self.context.as_deref().filter(|text| !text.is_empty()),
        }
    }
}

/// Outcome classification of the process run, kept for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Succeeded,
    TimedOut,
    Crashed,
    MalformedOutput,
}

/// Audit record of one hook run
#[derive(Debug, Clone, Serialize)]
pub struct HookInvocation {
    pub hook: String,
    pub scope: HookScope,
    pub event: HookEventKind,
    pub request: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub outcome: InvocationOutcome,
}

impl HookInvocation {
    pub fn new(
        hook: &str,
        scope: HookScope,
        event: HookEventKind,
        request: &str,
        output: ProcessOutput,
        duration: Duration,
        outcome: InvocationOutcome,
    ) -> Self {
        Self {
            hook: hook.to_string(),
            scope,
            event,
            request: request.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration_ms: duration.as_millis() as u64,
            outcome,
        }
    }
}

/// Interpret a finished run. Never fails: every path ends in a decision.
///
/// The exit code plays no part. A hook that exits non-zero but prints a
/// valid response is judged by that response.
pub fn interpret(
    hook: &str,
    scope: HookScope,
    output: &ProcessOutput,
    gate: Gate,
) -> (InvocationOutcome, HookDecision) {
    let decide = |verdict: Verdict, context: Option<String>, veto_ignored: bool| HookDecision {
        hook: hook.to_string(),
        scope,
        verdict,
        context,
        veto_ignored,
    };

    match &output.termination {
        Termination::TimedOut => (
            InvocationOutcome::TimedOut,
            decide(
                Verdict::Faulted {
                    fault: Fault::TimedOut,
                },
                None,
                false,
            ),
        ),
        Termination::Failed(reason) => (
            InvocationOutcome::Crashed,
            decide(
                Verdict::Faulted {
                    fault: Fault::Crashed {
                        reason: reason.clone(),
                    },
                },
                None,
                false,
            ),
        ),
        Termination::Exited => match output
            .stdout_fault
            .clone()
            .map_or_else(|| decode_response(&output.stdout), Err)
        {
            Err(e) => (
                InvocationOutcome::MalformedOutput,
                decide(
                    Verdict::Faulted {
                        fault: Fault::MalformedOutput {
                            reason: e.to_string(),
                        },
                    },
                    None,
                    false,
                ),
            ),
            Ok(response) => {
                let context = Some(response.context_modification).filter(|c| !c.is_empty());
                let decision = match (response.cancel, gate) {
                    (true, Gate::Blocking) => {
                        let reason = response
                            .error_message
                            .filter(|reason| !reason.trim().is_empty())
                            .unwrap_or_else(|| generic_rejection(hook));
                        decide(Verdict::Denied { reason }, context, false)
                    }
                    (true, Gate::Advisory) => decide(Verdict::Allowed, context, true),
                    (false, _) => decide(Verdict::Allowed, context, false),
                };
                (InvocationOutcome::Succeeded, decision)
            }
        },
    }
}

fn generic_rejection(hook: &str) -> String {
    format!("Operation blocked by hook '{}'", hook)
}
