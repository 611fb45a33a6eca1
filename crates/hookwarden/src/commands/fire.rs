use anyhow::{Context, Result};
use hookwarden_engine::hooks::{DispatchContext, Dispatcher, HookEvent, HookEventKind};
use hookwarden_engine::{EngineConfig, HookRegistry};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Fire one event at the resolved hooks. A veto is reported in the output,
/// not as an error.
pub async fn execute(
    event: &str,
    roots: Vec<PathBuf>,
    payload: Option<&str>,
    timeout_ms: Option<u64>,
    config: &EngineConfig,
) -> Result<()> {
    let kind: HookEventKind = event.parse()?;
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => Value::Null,
    };
    let event = HookEvent::from_payload(kind, payload)
        .context(format!("--payload does not match the {} payload", kind))?;

    let timeout = match timeout_ms {
        Some(0) => anyhow::bail!("--timeout-ms must be positive"),
        Some(ms) => Duration::from_millis(ms),
        None => config.timeout(),
    };

    let registry = HookRegistry::from_config(config);
    let hooks = registry.resolve(&roots).for_event(kind);
    let task_id = Uuid::new_v4().to_string();
    info!(event = %kind, hooks = hooks.len(), task_id = %task_id, "Firing event");

    let dispatcher = Dispatcher::new(
        DispatchContext {
            task_id,
            workspace_roots: roots,
            actor_id: config.actor_id.clone(),
            timeout,
        },
        config.open_audit_sink()?,
    );
    let outcome = dispatcher.run_on_worker(hooks, event).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
