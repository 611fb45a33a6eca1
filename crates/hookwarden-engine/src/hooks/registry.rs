use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::events::HookEventKind;
use super::hook::{Hook, HookDescriptor, HookScope};
use super::invoker::{ProcessHook, DEFAULT_MAX_OUTPUT_BYTES};
use crate::config::EngineConfig;

/// Where hook executables are looked up
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub enabled: bool,
    /// User-global hook directory, if any
    pub user_dir: Option<PathBuf>,
    /// Hook directory relative to each workspace root
    pub project_dir: PathBuf,
    pub max_output_bytes: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            user_dir: None,
            project_dir: PathBuf::from(".hookwarden/hooks"),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Resolves which hooks serve which event.
///
/// Executables are discovered on disk at resolution time; in-process hooks
/// can be added with [`register`](Self::register). For every event the
/// user-global tier contributes first, and any project-tier hook replaces
/// the whole user tier for that event.
pub struct HookRegistry {
    settings: RegistrySettings,
    registered: DashMap<HookEventKind, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            registered: DashMap::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(RegistrySettings {
            enabled: config.hooks.enabled,
            user_dir: config.user_hooks_dir(),
            project_dir: PathBuf::from(&config.hooks.project_dir),
            max_output_bytes: config.hooks.max_output_bytes,
        })
    }

    /// Register an in-process hook for an event
    pub fn register(&self, event: HookEventKind, hook: Arc<dyn Hook>) {
        self.registered.entry(event).or_default().push(hook);
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Resolve the on-disk descriptors for a workspace, with project
    /// scope already overriding user scope.
    pub fn resolve_descriptors(&self, workspace_roots: &[PathBuf]) -> Vec<HookDescriptor> {
        if !self.settings.enabled {
            return Vec::new();
        }

        let user = match &self.settings.user_dir {
            Some(dir) => scan_dir(dir, HookScope::User),
            None => Vec::new(),
        };
        // Roots may repeat or alias one another; each hook file runs once,
        // at the position of its first root.
        let mut seen = HashSet::new();
        let project: Vec<HookDescriptor> = workspace_roots
            .iter()
            .flat_map(|root| scan_dir(&root.join(&self.settings.project_dir), HookScope::Project))
            .filter(|descriptor| seen.insert(descriptor.path.clone()))
            .collect();

        let mut resolved = Vec::new();
        for kind in HookEventKind::ALL {
            let project_for_kind: Vec<_> = project.iter().filter(|d| d.event == kind).collect();
            if project_for_kind.is_empty() {
                resolved.extend(user.iter().filter(|d| d.event == kind).cloned());
            } else {
                resolved.extend(project_for_kind.into_iter().cloned());
            }
        }
        resolved
    }

    /// Build the immutable per-task hook table
    pub fn resolve(&self, workspace_roots: &[PathBuf]) -> ResolvedHooks {
        let mut tiers: HashMap<HookEventKind, (Vec<Arc<dyn Hook>>, Vec<Arc<dyn Hook>>)> =
            HashMap::new();

        for descriptor in self.resolve_descriptors(workspace_roots) {
            let (user, project) = tiers.entry(descriptor.event).or_default();
            let tier = match descriptor.scope {
                HookScope::User => user,
                HookScope::Project => project,
            };
            tier.push(Arc::new(
                ProcessHook::new(descriptor).with_output_limit(self.settings.max_output_bytes),
            ));
        }

        for entry in self.registered.iter() {
            let (user, project) = tiers.entry(*entry.key()).or_default();
            for hook in entry.value() {
                match hook.scope() {
                    HookScope::User => user.push(hook.clone()),
                    HookScope::Project => project.push(hook.clone()),
                }
            }
        }

        let mut by_event = HashMap::new();
        for (kind, (user, project)) in tiers {
            let chain = if project.is_empty() { user } else { project };
            if !chain.is_empty() {
                by_event.insert(kind, Arc::<[Arc<dyn Hook>]>::from(chain));
            }
        }

        ResolvedHooks { by_event }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

/// Hooks resolved for one task, in invocation order per event
#[derive(Clone, Default)]
pub struct ResolvedHooks {
    by_event: HashMap<HookEventKind, Arc<[Arc<dyn Hook>]>>,
}

impl ResolvedHooks {
    pub fn for_event(&self, kind: HookEventKind) -> Arc<[Arc<dyn Hook>]> {
        self.by_event
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn has_hooks(&self, kind: HookEventKind) -> bool {
        self.by_event.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

/// Scan one directory for eligible hook executables. Errors are logged and
/// the offending directory or candidate skipped.
fn scan_dir(dir: &Path, scope: HookScope) -> Vec<HookDescriptor> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(dir = ?dir, %scope, error = %e, "Skipping unreadable hook directory");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Skipping unreadable hook directory entry");
                continue;
            }
        };

        let file_name = entry.file_name();
        let Some(kind) = file_name.to_str().and_then(HookEventKind::from_name) else {
            debug!(path = ?entry.path(), "Ignoring file that is not named after a hook event");
            continue;
        };

        let path = entry.path();
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = ?path, error = %e, "Skipping hook candidate");
                continue;
            }
        };
        if !metadata.is_file() {
            debug!(path = ?path, "Skipping hook candidate that is not a file");
            continue;
        }
        if !is_executable(&metadata) {
            warn!(path = ?path, "Skipping hook candidate that is not executable");
            continue;
        }

        let path = std::fs::canonicalize(&path).unwrap_or(path);
        found.push(HookDescriptor {
            path,
            scope,
            event: kind,
        });
    }

    // read_dir order is unspecified
    found.sort_by(|a, b| a.event.cmp(&b.event));
    found
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
