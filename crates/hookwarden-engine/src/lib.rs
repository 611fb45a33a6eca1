pub mod audit;
pub mod config;
pub mod context;
pub mod hooks;
pub mod lifecycle;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::{AuditRecord, AuditSink, JsonlAuditLog, MemoryAuditLog, TracingAuditSink};
pub use config::EngineConfig;
pub use context::{ContextAccumulator, ContextEntry};
pub use hooks::{
    Dispatcher, EventOutcome, Gate, Hook, HookDecision, HookEvent, HookEventKind, HookRegistry,
    HookResponse, HookScope, ProcessHook, Verdict, PROTOCOL_VERSION,
};
pub use lifecycle::{GateDecision, LifecycleError, ModelTurn, TaskController, TaskState, ToolRun};

/// Initialize structured JSON logging on stderr.
///
/// Stdout is left alone so a binary can print machine-readable output.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
