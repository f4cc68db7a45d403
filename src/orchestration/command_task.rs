//! Background shell command execution unit.
//!
//! Spawns a long-running shell command as a tokio child process with piped
//! output. The spawned process:
//! - runs in its own process group (`process_group(0)`) for clean shutdown
//! - has `kill_on_drop(true)` as a safety net
//! - respects its [`CancellationToken`]: cancellation SIGKILLs the whole
//!   process group and publishes status `Killed`
//! - publishes its exit status and captured output through the supervisor

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::supervisor::TaskSupervisor;
use super::types::{TaskId, TaskKind, TaskStatus};

/// Maximum number of captured output lines retained per task.
const OUTPUT_LINE_CAP: usize = 1000;

/// Spawn a background shell command under the supervisor.
///
/// Registers the task as `Running` and returns its id immediately; the
/// monitor task publishes the terminal state when the process exits or is
/// killed. Returns `Err` with a descriptive message if the process fails to
/// spawn.
pub fn spawn_command(supervisor: &TaskSupervisor, command: String) -> Result<TaskId, String> {
    let kind = TaskKind::Command { command: command.clone() };
    let id = supervisor.allocate_id(&kind);
    let cancel_token = supervisor.child_token();
    supervisor.register(id.clone(), kind, cancel_token.clone());

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string());
    let spawned = Command::new(shell)
        .arg("-c")
        .arg(&command)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let msg = format!("Failed to spawn background process: {e}");
            supervisor.finish(&id, TaskStatus::Failed(msg.clone()), String::new(), msg.clone(), 0);
            return Err(msg);
        }
    };

    // Private output buffer: the readers below are the only writers, and the
    // monitor publishes the joined text into the supervisor exactly once.
    let lines: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, lines.clone(), None));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, lines.clone(), Some("[stderr] ")));
    }

    let task_id = id.clone();
    let task_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move {
        let outcome = tokio::select! {
            wait_result = child.wait() => match wait_result {
                Ok(status) => match status.code() {
                    Some(0) => (TaskStatus::Completed, String::new()),
                    Some(code) => (
                        TaskStatus::Failed(format!("process exited with code {code}")),
                        format!("process exited with code {code}"),
                    ),
                    None => (
                        TaskStatus::Failed("process terminated by signal".to_string()),
                        "process terminated by signal".to_string(),
                    ),
                },
                Err(e) => (
                    TaskStatus::Failed(format!("process wait failed: {e}")),
                    format!("process wait failed: {e}"),
                ),
            },
            _ = cancel_token.cancelled() => {
                // Kill the entire process group, then reap to avoid zombies.
                if let Some(pid) = child.id() {
                    let pgid = nix::unistd::Pid::from_raw(pid as i32);
                    let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
                }
                let _ = child.wait().await;
                (TaskStatus::Killed, "Killed by user".to_string())
            }
        };

        // Drain the readers before publishing: the pipes hit EOF once the
        // process is gone, but buffered lines may still be in flight.
        for reader in readers {
            let _ = reader.await;
        }

        let output = {
            let buf = lines.lock().unwrap();
            buf.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
        };
        let (status, error) = outcome;
        task_supervisor.finish(&task_id, status, output, error, 0);
    });

    supervisor.set_join_handle(&id, handle);
    Ok(id)
}

/// Read lines from a child stream into the shared buffer, bounded at
/// [`OUTPUT_LINE_CAP`] (oldest lines dropped first).
fn spawn_line_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    lines: Arc<Mutex<VecDeque<String>>>,
    prefix: Option<&'static str>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let reader = BufReader::new(stream);
        let mut stream_lines = reader.lines();
        while let Ok(Some(line)) = stream_lines.next_line().await {
            let mut buf = lines.lock().unwrap();
            if buf.len() >= OUTPUT_LINE_CAP {
                buf.pop_front();
            }
            match prefix {
                Some(p) => buf.push_back(format!("{p}{line}")),
                None => buf.push_back(line),
            }
        }
    })
}
