use hookwarden_sdk::{
    read_request_from_reader, run_with, write_response_to_writer, HookEvent, HookEventKind,
    HookResponse, PROTOCOL_VERSION,
};
use serde_json::{json, Value};

fn pre_tool_use_request() -> String {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "hookName": "PreToolUse",
        "timestamp": "2026-01-05T10:00:00.000Z",
        "taskId": "task-1",
        "workspaceRoots": ["/work"],
        "userId": "dev",
        "preToolUse": {"toolName": "shell", "parameters": {"command": "ls"}},
        "futureField": {"nested": true}
    })
    .to_string()
}

#[test]
fn test_reads_typed_request() {
    let request = read_request_from_reader(pre_tool_use_request().as_bytes()).unwrap();
    assert!(request.is_supported_protocol());
    assert_eq!(request.event_kind(), Some(HookEventKind::PreToolUse));
    assert_eq!(request.workspace_roots, ["/work"]);

    let call = request.pre_tool_use.as_ref().unwrap();
    assert_eq!(call.tool_name, "shell");
    assert_eq!(call.parameters["command"], "ls");
    assert!(matches!(request.event(), Some(HookEvent::PreToolUse(_))));
    assert_eq!(request.extra["futureField"]["nested"], true);
}

#[test]
fn test_unknown_event_has_no_typed_event() {
    let request = read_request_from_reader(&br#"{"hookName": "Nope"}"#[..]).unwrap();
    assert_eq!(request.event_kind(), None);
    assert!(request.event().is_none());
}

#[test]
fn test_response_is_one_json_line() {
    let mut out = Vec::new();
    write_response_to_writer(&mut out, &HookResponse::deny("blocked").with_context("why")).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 1);

    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value,
        json!({"cancel": true, "errorMessage": "blocked", "contextModification": "why"})
    );
}

#[test]
fn test_run_answers_with_handler_response() {
    let mut out = Vec::new();
    let mut err = Vec::new();
    run_with(pre_tool_use_request().as_bytes(), &mut out, &mut err, |request| {
        assert_eq!(request.task_id, "task-1");
        Ok(HookResponse::deny("no shell"))
    })
    .unwrap();

    let response: HookResponse = serde_json::from_slice(&out).unwrap();
    assert!(response.cancel);
    assert_eq!(response.error_message.as_deref(), Some("no shell"));
    assert!(err.is_empty());
}

#[test]
fn test_run_allows_when_handler_fails() {
    let mut out = Vec::new();
    let mut err = Vec::new();
    run_with(pre_tool_use_request().as_bytes(), &mut out, &mut err, |_| {
        anyhow::bail!("lint config missing")
    })
    .unwrap();

    let response: HookResponse = serde_json::from_slice(&out).unwrap();
    assert_eq!(response, HookResponse::allow());
    assert!(String::from_utf8(err).unwrap().contains("lint config missing"));
}

#[test]
fn test_run_allows_on_unreadable_request() {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut called = false;
    run_with(&b"not json"[..], &mut out, &mut err, |_| {
        called = true;
        Ok(HookResponse::deny("unreachable"))
    })
    .unwrap();

    assert!(!called);
    let response: HookResponse = serde_json::from_slice(&out).unwrap();
    assert!(!response.cancel);
    assert!(String::from_utf8(err).unwrap().contains("not valid JSON"));
}
