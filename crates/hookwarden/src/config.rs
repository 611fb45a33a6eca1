use anyhow::Result;
use hookwarden_engine::EngineConfig;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "hookwarden.toml";

/// Load config from the given file, `./hookwarden.toml`, or defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(Some(path)),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            if local.is_file() {
                EngineConfig::load(Some(&local))
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

/// Absolute workspace roots, defaulting to the current directory
pub fn workspace_roots(workspaces: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let roots = if workspaces.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        workspaces.to_vec()
    };
    roots
        .into_iter()
        .map(|root| {
            std::fs::canonicalize(&root)
                .map_err(|e| anyhow::anyhow!("Workspace {:?} is not accessible: {}", root, e))
        })
        .collect()
}
