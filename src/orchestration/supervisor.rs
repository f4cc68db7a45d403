//! Central registry for background commands and sub-agents.
//!
//! [`TaskSupervisor`] is the single source of truth for task status. It wraps
//! a `HashMap` behind `Arc<Mutex<..>>` for thread-safe access from the query
//! loop, tool dispatch, and the execution units. Each execution unit buffers
//! its own mutable state privately and publishes the terminal result exactly
//! once, under the supervisor lock, via [`TaskSupervisor::finish`].
//!
//! **Cancellation model:** each entry holds a [`CancellationToken`] created
//! as a child of the supervisor's root token. Cancelling the root token
//! cascades shutdown to every entry; cancelling one entry signals only its
//! execution unit, which observes the token at its next checkpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{TaskId, TaskKind, TaskSnapshot, TaskStatus, WaitOutcome};

/// Fixed poll interval for [`TaskSupervisor::wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Internal entry stored in the registry. Not exposed publicly -- callers see
/// [`TaskSnapshot`] clones via `snapshot` / `list`.
struct TaskEntry {
    kind: TaskKind,
    status: TaskStatus,
    started_at: String,
    ended_at: Option<String>,
    started: Instant,
    elapsed_secs: Option<f64>,
    output: String,
    error: String,
    tokens_used: u64,
    cancel_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn snapshot(&self, id: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: id.to_string(),
            kind: self.kind.clone(),
            status: self.status.clone(),
            started_at: self.started_at.clone(),
            ended_at: self.ended_at.clone(),
            elapsed_secs: self
                .elapsed_secs
                .unwrap_or_else(|| self.started.elapsed().as_secs_f64()),
            output: self.output.clone(),
            error: self.error.clone(),
            tokens_used: self.tokens_used,
        }
    }
}

/// Registry of asynchronous units of work with uniform lifecycle operations.
///
/// Designed to be cloned freely -- all fields are behind `Arc` -- and shared
/// across the query loop, tool dispatch, and spawned execution units.
#[derive(Clone)]
pub struct TaskSupervisor {
    entries: Arc<Mutex<HashMap<TaskId, TaskEntry>>>,
    counter: Arc<AtomicU64>,
    root_token: CancellationToken,
}

impl TaskSupervisor {
    pub fn new(root_token: CancellationToken) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
            root_token,
        }
    }

    /// Allocate the next id for the given kind. One shared counter backs both
    /// kinds, so ids are strictly increasing process-wide and never reused.
    pub(crate) fn allocate_id(&self, kind: &TaskKind) -> TaskId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{n}", kind.id_prefix())
    }

    /// Register a new entry with status `Running`.
    pub(crate) fn register(&self, id: TaskId, kind: TaskKind, cancel_token: CancellationToken) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            id,
            TaskEntry {
                kind,
                status: TaskStatus::Running,
                started_at: Utc::now().to_rfc3339(),
                ended_at: None,
                started: Instant::now(),
                elapsed_secs: None,
                output: String::new(),
                error: String::new(),
                tokens_used: 0,
                cancel_token,
                join_handle: None,
            },
        );
    }

    /// Attach the execution unit's JoinHandle for later cleanup.
    pub(crate) fn set_join_handle(&self, id: &TaskId, handle: JoinHandle<()>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            entry.join_handle = Some(handle);
        }
    }

    /// Publish the terminal state of a task.
    ///
    /// Called exactly once by the sole producing execution unit. If the entry
    /// is already terminal (a cancel raced ahead) the call is ignored, so the
    /// running-to-terminal transition happens at most once.
    pub(crate) fn finish(
        &self,
        id: &TaskId,
        status: TaskStatus,
        output: String,
        error: String,
        tokens_used: u64,
    ) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            if entry.status.is_terminal() {
                return;
            }
            entry.status = status;
            entry.ended_at = Some(Utc::now().to_rfc3339());
            entry.elapsed_secs = Some(entry.started.elapsed().as_secs_f64());
            entry.output = output;
            entry.error = error;
            entry.tokens_used = tokens_used;
        }
    }

    /// Thread-safe read of one task's state. `None` if unknown.
    pub fn snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        let entries = self.entries.lock().unwrap();
        entries.get(id).map(|e| e.snapshot(id))
    }

    /// Snapshots of all registered tasks, ordered by id allocation.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let entries = self.entries.lock().unwrap();
        let mut all: Vec<TaskSnapshot> = entries.iter().map(|(id, e)| e.snapshot(id)).collect();
        all.sort_by_key(|s| id_ordinal(&s.id));
        all
    }

    /// Snapshots of agent tasks only.
    pub fn list_agents(&self) -> Vec<TaskSnapshot> {
        self.list()
            .into_iter()
            .filter(|s| matches!(s.kind, TaskKind::Agent { .. }))
            .collect()
    }

    /// Raise a task's cancellation signal.
    ///
    /// The execution unit observes the token at its next checkpoint (process
    /// kill for commands, loop exit before the next LLM call for agents) and
    /// publishes the killed/cancelled state itself. Cancelling an
    /// already-terminal task is a no-op returning the existing snapshot --
    /// never an error. `None` if the id is unknown.
    pub fn cancel(&self, id: &str) -> Option<TaskSnapshot> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(id)?;
        if !entry.status.is_terminal() {
            entry.cancel_token.cancel();
        }
        Some(entry.snapshot(id))
    }

    /// Poll until the task is terminal or the timeout elapses.
    ///
    /// A timeout returns [`WaitOutcome::TimedOut`] without mutating task
    /// state; the task keeps running and its result remains retrievable.
    /// `None` if the id is unknown.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Option<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot(id)?;
            if snapshot.status.is_terminal() {
                return Some(WaitOutcome::Finished(snapshot));
            }
            if Instant::now() >= deadline {
                return Some(WaitOutcome::TimedOut);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }

    /// Remove a terminal entry from the registry. Running tasks are kept.
    /// Returns how many entries were removed.
    pub fn clear_finished(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.status.is_terminal());
        before - entries.len()
    }

    /// Create a child cancellation token for a new execution unit.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.root_token.child_token()
    }

    /// Shut down all tasks: cancel the root token, then await every
    /// JoinHandle with a per-handle timeout of 5 seconds.
    pub async fn shutdown_all(&self) {
        self.root_token.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .values_mut()
                .filter_map(|e| e.join_handle.take())
                .collect()
        };

        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

/// Numeric part of a `task_N` / `agent_N` id, for stable list ordering.
fn id_ordinal(id: &str) -> u64 {
    id.rsplit('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_supervisor() -> TaskSupervisor {
        TaskSupervisor::new(CancellationToken::new())
    }

    fn command_kind(cmd: &str) -> TaskKind {
        TaskKind::Command { command: cmd.into() }
    }

    #[test]
    fn ids_are_strictly_increasing_across_kinds() {
        let sup = test_supervisor();
        let a = sup.allocate_id(&command_kind("ls"));
        let b = sup.allocate_id(&TaskKind::Agent { role: "r".into(), task: "t".into() });
        let c = sup.allocate_id(&command_kind("pwd"));
        assert_eq!(a, "task_1");
        assert_eq!(b, "agent_2");
        assert_eq!(c, "task_3");
    }

    #[test]
    fn register_then_snapshot_is_running() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("sleep 1"));
        sup.register(id.clone(), command_kind("sleep 1"), sup.child_token());

        let snap = sup.snapshot(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Running);
        assert!(snap.ended_at.is_none());
    }

    #[test]
    fn finish_publishes_terminal_state_once() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("true"));
        sup.register(id.clone(), command_kind("true"), sup.child_token());

        sup.finish(&id, TaskStatus::Completed, "out".into(), String::new(), 0);
        // A second publish must not overwrite the first terminal state.
        sup.finish(&id, TaskStatus::Failed("late".into()), "x".into(), "x".into(), 0);

        let snap = sup.snapshot(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.output, "out");
        assert!(snap.ended_at.is_some());
    }

    #[test]
    fn cancel_running_raises_token() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("sleep 99"));
        let token = sup.child_token();
        sup.register(id.clone(), command_kind("sleep 99"), token.clone());

        assert!(!token.is_cancelled());
        sup.cancel(&id).unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_terminal_is_idempotent_noop() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("true"));
        let token = sup.child_token();
        sup.register(id.clone(), command_kind("true"), token.clone());
        sup.finish(&id, TaskStatus::Completed, "done".into(), String::new(), 0);

        let first = sup.cancel(&id).unwrap();
        let second = sup.cancel(&id).unwrap();
        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(second.status, TaskStatus::Completed);
        assert_eq!(first.output, second.output);
        // The token was never raised for an already-terminal task.
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_returns_none() {
        let sup = test_supervisor();
        assert!(sup.cancel("task_404").is_none());
    }

    #[test]
    fn list_is_ordered_by_allocation() {
        let sup = test_supervisor();
        for cmd in ["a", "b", "c"] {
            let id = sup.allocate_id(&command_kind(cmd));
            sup.register(id, command_kind(cmd), sup.child_token());
        }
        let ids: Vec<String> = sup.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["task_1", "task_2", "task_3"]);
    }

    #[tokio::test]
    async fn wait_times_out_without_mutating() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("sleep 99"));
        sup.register(id.clone(), command_kind("sleep 99"), sup.child_token());

        let outcome = sup.wait(&id, Duration::from_millis(50)).await.unwrap();
        assert!(matches!(outcome, WaitOutcome::TimedOut));
        assert_eq!(sup.snapshot(&id).unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn wait_returns_finished_for_terminal_task() {
        let sup = test_supervisor();
        let id = sup.allocate_id(&command_kind("true"));
        sup.register(id.clone(), command_kind("true"), sup.child_token());
        sup.finish(&id, TaskStatus::Completed, "ok".into(), String::new(), 0);

        match sup.wait(&id, Duration::from_secs(1)).await.unwrap() {
            WaitOutcome::Finished(snap) => assert_eq!(snap.output, "ok"),
            WaitOutcome::TimedOut => panic!("expected Finished"),
        }
    }

    #[test]
    fn clear_finished_keeps_running_tasks() {
        let sup = test_supervisor();
        let done = sup.allocate_id(&command_kind("true"));
        sup.register(done.clone(), command_kind("true"), sup.child_token());
        sup.finish(&done, TaskStatus::Completed, String::new(), String::new(), 0);

        let running = sup.allocate_id(&command_kind("sleep 99"));
        sup.register(running.clone(), command_kind("sleep 99"), sup.child_token());

        assert_eq!(sup.clear_finished(), 1);
        assert!(sup.snapshot(&done).is_none());
        assert!(sup.snapshot(&running).is_some());
    }
}
