use anyhow::Result;
use hookwarden_engine::{EngineConfig, HookRegistry};
use std::path::PathBuf;

pub fn execute(roots: &[PathBuf], config: &EngineConfig) -> Result<()> {
    if !config.hooks.enabled {
        println!("Hooks are disabled (hooks.enabled = false).");
        return Ok(());
    }

    let registry = HookRegistry::from_config(config);
    let descriptors = registry.resolve_descriptors(roots);

    if descriptors.is_empty() {
        println!("No hooks found.");
        if let Some(dir) = config.user_hooks_dir() {
            println!("User hook directory: {:?}", dir);
        }
        for root in roots {
            println!("Project hook directory: {:?}", root.join(&config.hooks.project_dir));
        }
        return Ok(());
    }

    println!("Resolved hooks:");
    for descriptor in descriptors {
        println!(
            "  {:<18} {:<8} {}",
            descriptor.event.as_str(),
            descriptor.scope.to_string(),
            descriptor.path.display()
        );
    }
    Ok(())
}
