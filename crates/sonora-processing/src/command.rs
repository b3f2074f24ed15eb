//! External process execution
//!
//! Every external tool the pipeline launches goes through [`run_tool`], which
//! bounds the invocation with a deadline and a cancellation token and
//! classifies its failure as a [`ToolError`].

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use sonora_core::ToolError;

const NO_SPACE_LEFT: &str = "No space left on device";

/// Captured output of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !combined.is_empty() && !self.stderr.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

/// Short name of a tool for errors and logs
pub fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

/// Run `program` with `args` and wait for it to exit.
///
/// The child is killed if `timeout` elapses or `cancel` fires first. Output
/// mentioning a full disk is reported as [`ToolError::NoSpaceLeft`] whatever
/// the exit status.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = tool_name(program);

    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled { tool });
    }

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    let started = Instant::now();

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!(
                tool = %tool,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tool cancelled"
            );
            return Err(ToolError::Cancelled { tool });
        }
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ToolError::Spawn { tool, source }),
            Err(_) => {
                tracing::warn!(tool = %tool, timeout_secs = timeout.as_secs(), "Tool timed out");
                return Err(ToolError::TimedOut {
                    tool,
                    timeout_secs: timeout.as_secs(),
                });
            }
        },
    };

    let output = ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    };
    let success = output.exit_code == Some(0);

    tracing::debug!(
        tool = %tool,
        exit_code = ?output.exit_code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Tool finished"
    );

    let combined = output.combined();
    if combined.contains(NO_SPACE_LEFT) {
        return Err(ToolError::NoSpaceLeft {
            tool,
            diagnostics: combined,
        });
    }

    if !success {
        return Err(ToolError::Exit {
            tool,
            code: output.exit_code,
            diagnostics: combined,
        });
    }

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_run_tool_captures_output() {
        let output = run_tool(
            "sh",
            ["-c", "echo '#channels 2'; echo warn >&2"],
            LONG,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout, "#channels 2\n");
        assert_eq!(output.stderr, "warn\n");
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.combined(), "#channels 2\nwarn\n");
    }

    #[tokio::test]
    async fn test_run_tool_non_zero_exit_keeps_diagnostics() {
        let err = run_tool(
            "sh",
            ["-c", "echo 'Invalid data found' >&2; exit 3"],
            LONG,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            ToolError::Exit {
                tool,
                code,
                diagnostics,
            } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(diagnostics, "Invalid data found\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_tool_detects_no_space_left() {
        let err = run_tool(
            "sh",
            ["-c", "echo 'write error: No space left on device' >&2; exit 1"],
            LONG,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::NoSpaceLeft { .. }));
    }

    #[tokio::test]
    async fn test_run_tool_missing_program() {
        let err = run_tool(
            "/nonexistent/sonora-tool",
            ["--help"],
            LONG,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { ref tool, .. } if tool == "sonora-tool"));
    }

    #[tokio::test]
    async fn test_run_tool_times_out() {
        let started = Instant::now();
        let err = run_tool(
            "sh",
            ["-c", "sleep 10"],
            Duration::from_millis(200),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_tool_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = run_tool("sh", ["-c", "sleep 10"], LONG, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_run_tool_already_cancelled_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_tool("/nonexistent/tool", ["x"], LONG, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name("/usr/bin/ffmpeg"), "ffmpeg");
        assert_eq!(tool_name("stereofy"), "stereofy");
    }
}
