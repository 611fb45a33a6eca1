use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditSink, JsonlAuditLog, TracingAuditSink};
use crate::context::DEFAULT_MAX_CONTEXT_BYTES;
use crate::hooks::invoker::DEFAULT_MAX_OUTPUT_BYTES;

const MAX_TIMEOUT_MS: u64 = 60_000;

/// Engine configuration, usually read from `hookwarden.toml`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    /// Reported to hooks as `userId`
    #[serde(default = "default_actor_id")]
    pub actor_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HooksConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-invocation timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-global hook directory. Empty disables the user tier.
    #[serde(default = "default_user_dir")]
    pub user_dir: String,

    /// Hook directory relative to each workspace root
    #[serde(default = "default_project_dir")]
    pub project_dir: String,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuditConfig {
    /// JSONL audit file; audit records only go to tracing when unset
    #[serde(default)]
    pub log_path: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_user_dir() -> String {
    "~/.hookwarden/hooks".to_string()
}

fn default_project_dir() -> String {
    ".hookwarden/hooks".to_string()
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_max_context_bytes() -> usize {
    DEFAULT_MAX_CONTEXT_BYTES
}

fn default_actor_id() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_ms: default_timeout_ms(),
            user_dir: default_user_dir(),
            project_dir: default_project_dir(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_context_bytes(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hooks: HooksConfig::default(),
            context: ContextConfig::default(),
            audit: AuditConfig::default(),
            actor_id: default_actor_id(),
        }
    }
}

impl EngineConfig {
    /// Load config from file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content).context(format!("Invalid config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hooks.timeout_ms == 0 || self.hooks.timeout_ms > MAX_TIMEOUT_MS {
            bail!(
                "hooks.timeout_ms must be between 1 and {}, got {}",
                MAX_TIMEOUT_MS,
                self.hooks.timeout_ms
            );
        }
        if self.hooks.max_output_bytes == 0 {
            bail!("hooks.max_output_bytes must be positive");
        }
        if self.context.max_bytes == 0 {
            bail!("context.max_bytes must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.hooks.timeout_ms)
    }

    /// Expanded user hook directory, `None` when disabled
    pub fn user_hooks_dir(&self) -> Option<PathBuf> {
        expand(&self.hooks.user_dir)
    }

    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.audit.log_path.as_deref().and_then(expand)
    }

    /// Audit sink described by this config
    pub fn open_audit_sink(&self) -> Result<Arc<dyn AuditSink>> {
        match self.audit_log_path() {
            Some(path) => Ok(Arc::new(JsonlAuditLog::open(&path)?)),
            None => Ok(Arc::new(TracingAuditSink)),
        }
    }
}

fn expand(raw: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(PathBuf::from(shellexpand::tilde(raw).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert!(config.hooks.enabled);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.hooks.project_dir, ".hookwarden/hooks");
        assert_eq!(config.context.max_bytes, 50 * 1024);
        assert!(config.audit_log_path().is_none());
        assert!(!config.actor_id.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            actor_id = "ci"

            [hooks]
            timeout_ms = 250
            user_dir = ""

            [audit]
            log_path = "/var/log/hookwarden.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.actor_id, "ci");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert!(config.user_hooks_dir().is_none());
        assert_eq!(
            config.audit_log_path(),
            Some(PathBuf::from("/var/log/hookwarden.jsonl"))
        );
    }

    #[test]
    fn test_tilde_expands() {
        let config = EngineConfig::default();
        let dir = config.user_hooks_dir().unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with(".hookwarden/hooks"));
    }

    #[test]
    fn test_rejects_out_of_range_timeout() {
        assert!(EngineConfig::from_toml_str("[hooks]\ntimeout_ms = 0").is_err());
        assert!(EngineConfig::from_toml_str("[hooks]\ntimeout_ms = 600000").is_err());
        assert!(EngineConfig::from_toml_str("[context]\nmax_bytes = 0").is_err());
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.hooks.timeout_ms, 5_000);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
