//! Type definitions for the task supervision subsystem.
//!
//! These types form the shared vocabulary between the
//! [`super::supervisor::TaskSupervisor`], the execution units, and tool
//! dispatch. Snapshot types derive [`serde::Serialize`] for JSON tool
//! responses.

use serde::Serialize;

use crate::text::truncate;

/// Unique identifier for a supervised task.
///
/// Allocated as `task_N` / `agent_N` from one shared counter, so ids are
/// strictly increasing across both kinds and never reused within a process
/// lifetime.
pub type TaskId = String;

/// Classifies what kind of work a supervised entry represents.
#[derive(Clone, Debug, Serialize)]
pub enum TaskKind {
    /// A background shell command.
    Command {
        /// The shell command that was spawned.
        command: String,
    },

    /// An autonomous sub-agent running its own tool-calling loop.
    Agent {
        /// Agent role/specialty (e.g. "researcher", "coder").
        role: String,
        /// The task description the agent was delegated.
        task: String,
    },
}

impl TaskKind {
    /// Id prefix for this kind: `task` for commands, `agent` for agents.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            TaskKind::Command { .. } => "task",
            TaskKind::Agent { .. } => "agent",
        }
    }
}

/// Lifecycle status of a supervised task.
///
/// Transitions from `Running` to exactly one terminal state, after which the
/// entry is immutable except for external removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Terminated with an error.
    Failed(String),
    /// Background command killed via cancellation.
    Killed,
    /// Sub-agent loop exited via cancellation.
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed(_) => "failed",
            TaskStatus::Killed => "killed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Read-only view of a supervised task, returned by status queries.
///
/// This is a snapshot -- the underlying entry may change after this clone is
/// returned (until it reaches a terminal state).
#[derive(Clone, Debug, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// ISO 8601 timestamp when the task was registered.
    pub started_at: String,
    /// ISO 8601 timestamp when the task reached a terminal state.
    pub ended_at: Option<String>,
    /// Wall-clock seconds: total runtime if terminal, time running so far if not.
    pub elapsed_secs: f64,
    /// Captured output (command output or agent final answer).
    pub output: String,
    /// Error text for failed/killed/cancelled tasks.
    pub error: String,
    /// Accumulated token usage (agents only).
    pub tokens_used: u64,
}

impl TaskSnapshot {
    /// One-line summary used by list-style tool responses.
    pub fn summary_line(&self) -> String {
        let what = match &self.kind {
            TaskKind::Command { command } => truncate(command, 50),
            TaskKind::Agent { task, .. } => truncate(task, 50),
        };
        format!(
            "  {} [{}] ({:.0}s) - {}",
            self.id,
            self.status.label(),
            self.elapsed_secs,
            what
        )
    }
}

/// Outcome of a bounded wait on a task.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The task reached a terminal state within the timeout.
    Finished(TaskSnapshot),
    /// The timeout elapsed first. Task state was not mutated.
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_not_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed("x".into()).is_terminal());
        assert!(TaskStatus::Killed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn id_prefix_per_kind() {
        let cmd = TaskKind::Command { command: "ls".into() };
        let agent = TaskKind::Agent { role: "coder".into(), task: "t".into() };
        assert_eq!(cmd.id_prefix(), "task");
        assert_eq!(agent.id_prefix(), "agent");
    }

    #[test]
    fn summary_line_truncates_long_commands() {
        let snap = TaskSnapshot {
            id: "task_1".into(),
            kind: TaskKind::Command { command: "x".repeat(60) },
            status: TaskStatus::Running,
            started_at: String::new(),
            ended_at: None,
            elapsed_secs: 1.0,
            output: String::new(),
            error: String::new(),
            tokens_used: 0,
        };
        assert!(snap.summary_line().ends_with("..."));
    }

    #[test]
    fn summary_line_handles_multibyte_commands() {
        let snap = TaskSnapshot {
            id: "task_1".into(),
            kind: TaskKind::Command { command: "→".repeat(60) },
            status: TaskStatus::Running,
            started_at: String::new(),
            ended_at: None,
            elapsed_secs: 1.0,
            output: String::new(),
            error: String::new(),
            tokens_used: 0,
        };
        let line = snap.summary_line();
        assert!(line.contains(&"→".repeat(50)));
        assert!(line.ends_with("..."));
    }
}
