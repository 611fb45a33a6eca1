//! Per-task buffer of hook-supplied context.
//!
//! Entries are appended as events settle and read only when the next
//! model-facing request is built, so context never influences the decision
//! of the event that produced it.

use serde::Serialize;
use tracing::warn;

use crate::hooks::HookEventKind;

/// Default cap on the rendered size of a task's context buffer
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 50 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    /// Hook that contributed the text
    pub source: String,
    pub event: HookEventKind,
    pub text: String,
}

impl ContextEntry {
    /// Entry wrapped in its boundary marker
    pub fn render(&self) -> String {
        format!(
            "<hook-context source=\"{}\" event=\"{}\">\n{}\n</hook-context>",
            self.source, self.event, self.text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Nothing to append
    Empty,
    /// Buffer full; `first_overflow` is set only for the first dropped entry
    Dropped { first_overflow: bool },
}

/// Append-only, size-capped context buffer with a read cursor.
///
/// Once an entry does not fit, the buffer is sealed and every later append
/// is dropped too, so the entries a reader sees are always a prefix of what
/// hooks contributed. Entries are never truncated.
#[derive(Debug)]
pub struct ContextAccumulator {
    entries: Vec<ContextEntry>,
    used_bytes: usize,
    max_bytes: usize,
    read_cursor: usize,
    sealed: bool,
    dropped: usize,
}

impl ContextAccumulator {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: Vec::new(),
            used_bytes: 0,
            max_bytes,
            read_cursor: 0,
            sealed: false,
            dropped: 0,
        }
    }

    pub fn append(&mut self, entry: ContextEntry) -> AppendOutcome {
        if entry.text.is_empty() {
            return AppendOutcome::Empty;
        }

        let size = entry.render().len();
        if self.sealed || self.used_bytes + size > self.max_bytes {
            let first_overflow = !self.sealed;
            if first_overflow {
                warn!(
                    source = %entry.source,
                    event = %entry.event,
                    entry_bytes = size,
                    used_bytes = self.used_bytes,
                    max_bytes = self.max_bytes,
                    "Hook context buffer full, dropping further context for this task"
                );
            }
            self.sealed = true;
            self.dropped += 1;
            return AppendOutcome::Dropped { first_overflow };
        }

        self.used_bytes += size;
        self.entries.push(entry);
        AppendOutcome::Appended
    }

    /// Entries appended since the previous call
    pub fn take_unread(&mut self) -> Vec<ContextEntry> {
        let unread = self.entries[self.read_cursor..].to_vec();
        self.read_cursor = self.entries.len();
        unread
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retire the buffer when its task ends
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
        self.read_cursor = 0;
    }
}

impl Default for ContextAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_BYTES)
    }
}

/// Join rendered entries for inclusion in a model request
pub fn render_entries(entries: &[ContextEntry]) -> String {
    entries
        .iter()
        .map(ContextEntry::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}
