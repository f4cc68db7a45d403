use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Stdout followed by stderr, the shape build/test diagnostics parsers
    /// expect (compilers interleave across both streams).
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run a command via `$SHELL -c` (falling back to `sh`) with a hard timeout.
///
/// Never returns an error: spawn failures and timeouts are reported inside
/// the [`ExecResult`] so callers can feed the outcome back to the model as
/// descriptive text rather than aborting.
///
/// On timeout the child is killed via `kill_on_drop` when its future is
/// dropped; `timed_out` is set and any captured output is discarded.
pub async fn execute_shell(command: &str, cwd: Option<&Path>, timeout: Duration) -> ExecResult {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string());

    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ExecResult {
                stdout: String::new(),
                stderr: format!("Failed to spawn shell process: {e}"),
                exit_code: None,
                timed_out: false,
            };
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            timed_out: false,
        },
        Ok(Err(e)) => ExecResult {
            stdout: String::new(),
            stderr: format!("Process execution failed: {e}"),
            exit_code: None,
            timed_out: false,
        },
        Err(_) => ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = execute_shell("echo hello", None, Duration::from_secs(5)).await;
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
        assert!(result.success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let result = execute_shell("exit 3", None, Duration::from_secs(5)).await;
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn timeout_sets_flag() {
        let result = execute_shell("sleep 5", None, Duration::from_millis(100)).await;
        assert!(result.timed_out);
        assert!(!result.success());
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn combined_output_joins_streams() {
        let result = execute_shell("echo out; echo err >&2", None, Duration::from_secs(5)).await;
        let combined = result.combined_output();
        assert!(combined.contains("out"));
        assert!(combined.contains("err"));
    }

    #[tokio::test]
    async fn runs_in_requested_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = execute_shell("pwd", Some(tmp.path()), Duration::from_secs(5)).await;
        let canonical = tmp.path().canonicalize().unwrap();
        assert_eq!(result.stdout.trim(), canonical.to_str().unwrap());
    }
}
