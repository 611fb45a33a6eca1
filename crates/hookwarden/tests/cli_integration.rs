use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn hookwarden(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hookwarden"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

/// Config with the user tier disabled so the real home directory never leaks in
fn isolated_config(dir: &Path) -> String {
    let path = dir.join("isolated.toml");
    std::fs::write(&path, "actor_id = \"cli-test\"\n\n[hooks]\nuser_dir = \"\"\ntimeout_ms = 2000\n")
        .unwrap();
    path.display().to_string()
}

#[test]
fn test_hookwarden_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = hookwarden(dir.path(), &["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_hookwarden_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = hookwarden(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "scaffold", "list", "fire"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_init_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();

    assert!(hookwarden(dir.path(), &["init"]).status.success());
    assert!(dir.path().join("hookwarden.toml").is_file());

    let again = hookwarden(dir.path(), &["init"]);
    assert!(!again.status.success());
}

#[test]
fn test_scaffold_rejects_unknown_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());
    let output = hookwarden(dir.path(), &["--config", &config, "scaffold", "BeforeTool"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown hook event"));
}

#[cfg(unix)]
#[test]
fn test_scaffold_list_and_fire() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());

    let output = hookwarden(dir.path(), &["--config", &config, "scaffold", "PreToolUse"]);
    assert!(output.status.success());
    let hook = dir.path().join(".hookwarden/hooks/PreToolUse");
    assert!(hook.is_file());

    let output = hookwarden(dir.path(), &["--config", &config, "list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PreToolUse"));
    assert!(stdout.contains("project"));

    let output = hookwarden(
        dir.path(),
        &[
            "--config",
            &config,
            "fire",
            "PreToolUse",
            "--payload",
            r#"{"toolName": "shell", "parameters": {"command": "ls"}}"#,
        ],
    );
    assert!(output.status.success());
    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["event"], "PreToolUse");
    assert_eq!(outcome["decisions"][0]["verdict"], "allowed");
    assert!(outcome.get("rejection").is_none());
}

#[cfg(unix)]
#[test]
fn test_fire_reports_veto_as_data() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());
    let hooks = dir.path().join(".hookwarden/hooks");
    std::fs::create_dir_all(&hooks).unwrap();
    let hook = hooks.join("PreToolUse");
    std::fs::write(
        &hook,
        "#!/bin/sh\ncat > /dev/null\necho '{\"cancel\": true, \"errorMessage\": \"blocked\"}'\n",
    )
    .unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = hookwarden(dir.path(), &["--config", &config, "fire", "PreToolUse"]);
    assert!(output.status.success());
    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["rejection"]["reason"], "blocked");
}

#[test]
fn test_fire_rejects_bad_payload() {
    let dir = tempfile::tempdir().unwrap();
    let config = isolated_config(dir.path());
    let output = hookwarden(
        dir.path(),
        &["--config", &config, "fire", "PreToolUse", "--payload", "{not json"],
    );
    assert!(!output.status.success());
}
