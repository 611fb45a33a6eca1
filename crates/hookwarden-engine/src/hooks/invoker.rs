use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::codec::{ProtocolError, PROTOCOL_VERSION};
use super::hook::{Hook, HookDescriptor, HookScope, InvocationRequest, ProcessOutput, Termination};

/// Default cap on each captured output stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long output readers may keep running once the hook itself is gone.
/// A grandchild that inherited the pipes can keep them open indefinitely;
/// output the hook wrote before exiting is kept either way.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Hook backed by an external executable speaking the JSON protocol over
/// stdin/stdout.
pub struct ProcessHook {
    descriptor: HookDescriptor,
    name: String,
    max_output_bytes: usize,
}

impl ProcessHook {
    pub fn new(descriptor: HookDescriptor) -> Self {
        let name = descriptor.path.display().to_string();
        Self {
            descriptor,
            name,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Cap captured stdout and stderr (each) at `bytes`
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn descriptor(&self) -> &HookDescriptor {
        &self.descriptor
    }

    async fn run(&self, request: &InvocationRequest) -> Result<ProcessOutput> {
        let mut command = Command::new(&self.descriptor.path);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("HOOKWARDEN_EVENT", request.event.as_str())
            .env("HOOKWARDEN_TASK_ID", &request.task_id)
            .env("HOOKWARDEN_PROTOCOL", PROTOCOL_VERSION);
        if let Some(dir) = request.working_dir.as_ref().filter(|dir| dir.is_dir()) {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn hook {:?}", self.descriptor.path))?;

        debug!(hook = %self.name, event = %request.event, "Hook process spawned");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().context("Hook stdout was not captured")?;
        let stderr = child.stderr.take().context("Hook stderr was not captured")?;

        // Read both streams concurrently with the wait so a chatty hook
        // cannot deadlock on a full pipe. Bytes land in shared buffers so
        // whatever arrived is kept even if a reader has to be abandoned.
        let stdout_capture = SharedCapture::default();
        let stderr_capture = SharedCapture::default();
        let stdout_reader = tokio::spawn(read_capped(
            stdout,
            self.max_output_bytes,
            stdout_capture.clone(),
        ));
        let stderr_reader = tokio::spawn(read_capped(
            stderr,
            self.max_output_bytes,
            stderr_capture.clone(),
        ));

        let exchange = async {
            if let Some(mut stdin) = stdin {
                // Hooks may exit without reading their input
                if let Err(e) = stdin.write_all(request.body.as_bytes()).await {
                    debug!(hook = %self.name, error = %e, "Hook did not consume its request");
                }
                let _ = stdin.shutdown().await;
            }
            child.wait().await
        };

        let (termination, exit_code) = match tokio::time::timeout(request.timeout, exchange).await
        {
            Ok(Ok(status)) => (Termination::Exited, status.code()),
            Ok(Err(e)) => (
                Termination::Failed(format!("Failed waiting for hook: {}", e)),
                None,
            ),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(hook = %self.name, error = %e, "Failed to kill timed-out hook");
                }
                (Termination::TimedOut, None)
            }
        };

        let stdout = collect(stdout_reader, stdout_capture, &self.name, "stdout").await;
        let stderr = collect(stderr_reader, stderr_capture, &self.name, "stderr").await;

        let (stdout, stdout_fault) = if stdout.truncated {
            (
                String::from_utf8_lossy(&stdout.bytes).into_owned(),
                Some(ProtocolError::OutputTooLarge {
                    limit: self.max_output_bytes,
                }),
            )
        } else {
            match String::from_utf8(stdout.bytes) {
                Ok(text) => (text, None),
                Err(e) => (
                    String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    Some(ProtocolError::InvalidUtf8),
                ),
            }
        };

        Ok(ProcessOutput {
            stdout,
            stdout_fault,
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            exit_code,
            termination,
        })
    }
}

#[async_trait]
impl Hook for ProcessHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> HookScope {
        self.descriptor.scope
    }

    async fn invoke(&self, request: &InvocationRequest) -> ProcessOutput {
        match self.run(request).await {
            Ok(output) => output,
            Err(e) => ProcessOutput::failed(format!("{:#}", e)),
        }
    }
}

/// Bytes captured from one output stream
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    /// Output went past the limit and the excess was discarded
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Append up to `limit` bytes into `capture`, then drain and discard the rest.
async fn read_capped<R>(mut reader: R, limit: usize, capture: SharedCapture) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut capture = capture.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let keep = n.min(limit.saturating_sub(capture.bytes.len()));
        capture.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            capture.truncated = true;
        }
    }
}

/// Wait briefly for a reader to hit EOF and take what it captured.
///
/// A descendant that inherited the pipe can hold it open after the hook
/// exits; the reader is then abandoned but its bytes are kept.
async fn collect(
    reader: JoinHandle<io::Result<()>>,
    capture: SharedCapture,
    hook: &str,
    stream: &'static str,
) -> Capture {
    let abort = reader.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, reader).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(hook, stream, error = %e, "Failed to read hook output"),
        Ok(Err(e)) => warn!(hook, stream, error = %e, "Hook output reader failed"),
        Err(_) => {
            abort.abort();
            debug!(hook, stream, "Hook output still open after exit, keeping what was read");
        }
    }

    let captured = std::mem::take(
        &mut *capture
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );
    if captured.truncated {
        warn!(hook, stream, "Hook output exceeded limit, excess discarded");
    }
    captured
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::hooks::events::{Gate, HookEventKind};
    use crate::hooks::interpreter::{interpret, Fault, Verdict};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("PreToolUse");
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn hook(path: PathBuf) -> ProcessHook {
        ProcessHook::new(HookDescriptor {
            path,
            scope: HookScope::Project,
            event: HookEventKind::PreToolUse,
        })
    }

    fn request(body: &str, timeout: Duration) -> InvocationRequest {
        InvocationRequest {
            event: HookEventKind::PreToolUse,
            task_id: "task-1".into(),
            body: body.into(),
            working_dir: None,
            timeout,
        }
    }

    #[tokio::test]
    async fn test_stdin_receives_exact_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "cat\n");
        let output = hook(path)
            .invoke(&request("{\"hello\":1}", Duration::from_secs(5)))
            .await;

        assert_eq!(output.termination, Termination::Exited);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "{\"hello\":1}");
    }

    #[tokio::test]
    async fn test_streams_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "echo 'diag one' >&2\necho '{\"cancel\": false}'\necho 'diag two' >&2\nexit 3\n",
        );
        let output = hook(path).invoke(&request("{}", Duration::from_secs(5))).await;

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "{\"cancel\": false}");
        assert!(output.stderr.contains("diag one"));
        assert!(output.stderr.contains("diag two"));
    }

    #[tokio::test]
    async fn test_env_exposes_event_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "echo \"$HOOKWARDEN_EVENT $HOOKWARDEN_TASK_ID\"\n");
        let output = hook(path).invoke(&request("{}", Duration::from_secs(5))).await;
        assert_eq!(output.stdout.trim(), "PreToolUse task-1");
    }

    #[tokio::test]
    async fn test_timeout_kills_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "exec sleep 30\n");
        let started = std::time::Instant::now();
        let output = hook(path)
            .invoke(&request("{}", Duration::from_millis(200)))
            .await;

        assert_eq!(output.termination, Termination::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let output = hook(PathBuf::from("/nonexistent/PreToolUse"))
            .invoke(&request("{}", Duration::from_secs(1)))
            .await;
        assert!(matches!(output.termination, Termination::Failed(_)));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "head -c 100000 /dev/zero | tr '\\0' 'a'\n");
        let output = hook(path)
            .with_output_limit(1024)
            .invoke(&request("{}", Duration::from_secs(5)))
            .await;

        assert_eq!(output.termination, Termination::Exited);
        assert_eq!(output.stdout.len(), 1024);
        assert_eq!(
            output.stdout_fault,
            Some(ProtocolError::OutputTooLarge { limit: 1024 })
        );
    }

    fn verdict_of(output: &ProcessOutput) -> Verdict {
        interpret("hook", HookScope::Project, output, Gate::Blocking)
            .1
            .verdict
    }

    #[tokio::test]
    async fn test_output_left_open_by_descendant_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "echo '{\"cancel\": true, \"errorMessage\": \"blocked\"}'\nsleep 5 &\nexit 0\n",
        );
        let started = std::time::Instant::now();
        let output = hook(path).invoke(&request("{}", Duration::from_secs(2))).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(output.termination, Termination::Exited);
        assert_eq!(
            verdict_of(&output),
            Verdict::Denied {
                reason: "blocked".into()
            }
        );
    }

    #[tokio::test]
    async fn test_decision_past_output_limit_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "printf '{\"cancel\": true, \"errorMessage\": \"x\"}'\n\
             head -c 2000 /dev/zero | tr '\\0' ' '\n\
             echo '{\"cancel\": false} garbage'\n",
        );
        let output = hook(path)
            .with_output_limit(100)
            .invoke(&request("{}", Duration::from_secs(5)))
            .await;

        assert!(output.stdout.starts_with("{\"cancel\": true"));
        assert!(matches!(
            verdict_of(&output),
            Verdict::Faulted {
                fault: Fault::MalformedOutput { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_stdout_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "printf '{\"cancel\": true, \"errorMessage\": \"\\377\"}'\n",
        );
        let output = hook(path).invoke(&request("{}", Duration::from_secs(5))).await;

        assert_eq!(output.stdout_fault, Some(ProtocolError::InvalidUtf8));
        assert_eq!(
            verdict_of(&output),
            Verdict::Faulted {
                fault: Fault::MalformedOutput {
                    reason: "output is not valid UTF-8".into()
                }
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_stderr_is_relayed_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "printf 'bad \\377 byte' >&2\necho '{}'\n");
        let output = hook(path).invoke(&request("{}", Duration::from_secs(5))).await;

        assert!(output.stdout_fault.is_none());
        assert!(output.stderr.starts_with("bad "));
        assert_eq!(verdict_of(&output), Verdict::Allowed);
    }
}
