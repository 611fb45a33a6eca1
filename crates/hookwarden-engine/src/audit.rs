//! Operator-facing audit trail.
//!
//! Every component that records audit data receives an `Arc<dyn AuditSink>`
//! explicitly. Sinks are append-only and must accept concurrent writers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::hooks::{HookEventKind, HookInvocation, Verdict};
use crate::lifecycle::TaskState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    /// One hook run and the verdict it produced
    Invocation {
        timestamp: DateTime<Utc>,
        task_id: String,
        invocation: HookInvocation,
        verdict: Verdict,
    },
    /// Hook stderr, relayed unmodified
    Diagnostic {
        timestamp: DateTime<Utc>,
        task_id: String,
        hook: String,
        event: HookEventKind,
        text: String,
    },
    /// The task's context buffer filled up
    ContextOverflow {
        timestamp: DateTime<Utc>,
        task_id: String,
        hook: String,
        event: HookEventKind,
    },
    Transition {
        timestamp: DateTime<Utc>,
        task_id: String,
        from: TaskState,
        to: TaskState,
    },
}

impl AuditRecord {
    pub fn task_id(&self) -> &str {
        match self {
            AuditRecord::Invocation { task_id, .. }
            | AuditRecord::Diagnostic { task_id, .. }
            | AuditRecord::ContextOverflow { task_id, .. }
            | AuditRecord::Transition { task_id, .. } => task_id,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Appends one JSON object per line to a file
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create audit log dir: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(format!("Failed to open audit log: {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: AuditRecord) {
        let mut line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit record");
                return;
            }
        };
        line.push('\n');

        // One write per record under the lock keeps lines whole
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = ?self.path, error = %e, "Failed to write audit record");
        }
    }
}

/// Keeps records in memory; useful for tests and embedding hosts
#[derive(Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}

/// Emits records as debug-level tracing events only
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match serde_json::to_string(&record) {
            Ok(json) => debug!(task_id = record.task_id(), record = %json, "audit"),
            Err(e) => warn!(error = %e, "Failed to serialize audit record"),
        }
    }
}
