use anyhow::{Context, Result};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# hookwarden configuration

# Reported to hooks as userId (defaults to $USER)
# actor_id = "anonymous"

[hooks]
enabled = true
timeout_ms = 5000
# Empty disables user-global hooks
user_dir = "~/.hookwarden/hooks"
# Relative to each workspace root
project_dir = ".hookwarden/hooks"
max_output_bytes = 1048576

[context]
max_bytes = 51200

[audit]
# log_path = "~/.hookwarden/audit.jsonl"
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, DEFAULT_CONFIG).context(format!("Failed to write {:?}", path))?;
    println!("Created config at {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwarden_engine::EngineConfig;

    #[test]
    fn test_default_config_parses() {
        let config = EngineConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hooks.timeout_ms, 5000);
        assert!(config.audit.log_path.is_none());
    }
}
