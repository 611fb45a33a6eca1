use anyhow::{bail, Context, Result};
use hookwarden_engine::{EngineConfig, HookEventKind};
use std::path::{Path, PathBuf};

/// Where a scaffolded hook goes
pub enum Target {
    Workspace(PathBuf),
    Global,
}

pub fn execute(event: &str, target: Target, config: &EngineConfig) -> Result<PathBuf> {
    let kind: HookEventKind = event.parse()?;

    let dir = match target {
        Target::Global => config
            .user_hooks_dir()
            .context("User hook directory is disabled (hooks.user_dir is empty)")?,
        Target::Workspace(root) => root.join(&config.hooks.project_dir),
    };
    let path = dir.join(kind.as_str());
    if path.exists() {
        bail!("Hook already exists at {:?}", path);
    }

    std::fs::create_dir_all(&dir).context(format!("Failed to create hook dir {:?}", dir))?;
    std::fs::write(&path, template(kind)).context(format!("Failed to write {:?}", path))?;
    make_executable(&path)?;

    println!("Created {} hook at {:?}", kind, path);
    Ok(path)
}

fn template(kind: HookEventKind) -> String {
    let decision = match kind {
        HookEventKind::PreToolUse => {
            "# To block the tool call:\n\
             # echo '{\"cancel\": true, \"errorMessage\": \"reason shown to the user\"}'\n\
             echo '{\"cancel\": false}'\n"
        }
        _ => {
            "# contextModification is added to the next model request\n\
             echo '{\"cancel\": false, \"contextModification\": \"\"}'\n"
        }
    };
    format!(
        "#!/bin/sh\n\
         # {kind} hook for hookwarden.\n\
         # The request arrives as one JSON object on stdin; the payload is under\n\
         # the \"{key}\" key. Write exactly one JSON object to stdout. Anything\n\
         # written to stderr goes to the audit log.\n\
         request=$(cat)\n\
         echo \"{kind} for task $HOOKWARDEN_TASK_ID\" >&2\n\
         \n\
         {decision}",
        kind = kind,
        key = payload_key(kind),
        decision = decision,
    )
}

fn payload_key(kind: HookEventKind) -> String {
    let name = kind.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .context(format!("Failed to mark {:?} executable", path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
