//! The watch service: lifecycle around the periodic build/repair loop.
//!
//! At most one watcher runs at a time. Start/stop/status are synchronous and
//! resolve against shared state under one mutex; the loop itself runs on its
//! own tokio task and stops when its [`CancellationToken`] is raised. A start
//! while a watcher is active is informational, never destructive.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::exec::execute_shell;
use crate::knowledge::KnowledgeStore;
use crate::text::truncate;

use super::detect;
use super::parse::parse_errors;
use super::repair::attempt_repair;
use super::types::{ErrorEvent, RepairResult, WatchConfig};

/// Rebuild check interval.
const CYCLE_INTERVAL: Duration = Duration::from_secs(5);
/// Bound on one build or test command.
const BUILD_TIMEOUT: Duration = Duration::from_secs(120);
/// Oldest history entries are dropped past this.
const HISTORY_CAP: usize = 100;

struct ActiveWatcher {
    config: WatchConfig,
    cancel_token: CancellationToken,
    last_build: Arc<Mutex<String>>,
    error_history: Arc<Mutex<VecDeque<ErrorEvent>>>,
    repair_history: Arc<Mutex<VecDeque<RepairResult>>>,
}

/// Shared handle to the (at most one) running watcher.
#[derive(Clone)]
pub struct WatchService {
    active: Arc<Mutex<Option<ActiveWatcher>>>,
    knowledge: Arc<dyn KnowledgeStore>,
    root: PathBuf,
}

impl WatchService {
    pub fn new(knowledge: Arc<dyn KnowledgeStore>, root: PathBuf) -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            knowledge,
            root,
        }
    }

    fn scope(&self) -> String {
        self.root.display().to_string()
    }

    /// Start the watch loop. Unset fields are filled by project detection.
    pub fn start(
        &self,
        patterns: Vec<String>,
        build_command: Option<String>,
        test_command: Option<String>,
    ) -> String {
        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return "Watcher already running. Use stop_watch first.".to_string();
        }

        let config = WatchConfig {
            patterns: if patterns.is_empty() {
                detect::detect_watch_patterns(&self.root)
            } else {
                patterns
            },
            build_command: build_command
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| detect::detect_build_command(&self.root)),
            test_command: test_command
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| detect::detect_test_command(&self.root)),
        };

        let watcher = ActiveWatcher {
            config: config.clone(),
            cancel_token: CancellationToken::new(),
            last_build: Arc::new(Mutex::new(String::new())),
            error_history: Arc::new(Mutex::new(VecDeque::new())),
            repair_history: Arc::new(Mutex::new(VecDeque::new())),
        };

        let loop_state = LoopState {
            config: config.clone(),
            language: detect::detect_language(&self.root).to_string(),
            scope: self.scope(),
            knowledge: self.knowledge.clone(),
            last_build: watcher.last_build.clone(),
            error_history: watcher.error_history.clone(),
            repair_history: watcher.repair_history.clone(),
        };
        let token = watcher.cancel_token.clone();
        tokio::spawn(async move { run_loop(loop_state, token).await });

        *active = Some(watcher);

        let mut result = String::from("Watch mode started\n");
        result.push_str(&format!("Build command: {}\n", config.build_command));
        if !config.test_command.is_empty() {
            result.push_str(&format!("Test command: {}\n", config.test_command));
        }
        result.push_str(&format!("Watching patterns: [{}]\n", config.patterns.join(" ")));
        result.push_str("\nErrors will be automatically detected and repairs attempted.");
        result
    }

    /// Stop the watch loop, reporting session totals.
    pub fn stop(&self) -> String {
        let mut active = self.active.lock().unwrap();
        let Some(watcher) = active.take() else {
            return "No watcher running.".to_string();
        };

        watcher.cancel_token.cancel();
        let errors = watcher.error_history.lock().unwrap().len();
        let repairs = watcher.repair_history.lock().unwrap().len();
        format!(
            "Watcher stopped. Detected {errors} errors, attempted {repairs} repairs during session."
        )
    }

    /// Human-readable status of the running watcher.
    pub fn status(&self) -> String {
        let active = self.active.lock().unwrap();
        let Some(watcher) = active.as_ref() else {
            return "No watcher running. Use start_watch to begin.".to_string();
        };

        let mut result = String::from("Watch Mode Status: ACTIVE\n========================\n\n");
        result.push_str(&format!("Build command: {}\n", watcher.config.build_command));
        result.push_str(&format!("Patterns: [{}]\n", watcher.config.patterns.join(" ")));
        result.push_str(&format!("Last build: {}\n", watcher.last_build.lock().unwrap()));

        let errors = watcher.error_history.lock().unwrap();
        let repairs = watcher.repair_history.lock().unwrap();
        result.push_str(&format!("Errors detected: {}\n", errors.len()));
        result.push_str(&format!("Repairs attempted: {}\n", repairs.len()));

        if !repairs.is_empty() {
            let successes = repairs.iter().filter(|r| r.success).count();
            result.push_str(&format!(
                "Repair success rate: {:.1}%\n",
                successes as f64 / repairs.len() as f64 * 100.0
            ));
        }

        if !errors.is_empty() {
            result.push_str("\nRecent errors:\n");
            for e in errors.iter().rev().take(5).rev() {
                result.push_str(&format!(
                    "  [{}] {}:{} - {}\n",
                    e.kind,
                    e.file,
                    e.line,
                    truncate(&e.message, 60)
                ));
            }
        }

        result
    }

    /// Run one build now, independent of any running watcher, attempting
    /// repairs for every diagnostic found.
    pub async fn trigger_build(&self, command: Option<String>) -> String {
        let command = command
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| detect::detect_build_command(&self.root));

        let exec = execute_shell(&command, None, BUILD_TIMEOUT).await;
        let output = exec.combined_output();
        if exec.success() {
            return format!("Build successful:\n{output}");
        }

        let language = detect::detect_language(&self.root);
        let events = parse_errors(&output, language);
        if events.is_empty() {
            return format!("Build failed:\n{output}");
        }

        let mut result = format!("Build failed with {} error(s):\n\n", events.len());
        for (i, e) in events.iter().enumerate() {
            result.push_str(&format!(
                "{}. [{}] {}:{}\n   {}\n\n",
                i + 1,
                e.kind,
                e.file,
                e.line,
                e.message
            ));

            let repair = attempt_repair(e, self.knowledge.as_ref(), &self.scope()).await;
            if repair.success {
                result.push_str(&format!("   AUTO-REPAIRED: {}\n\n", repair.solution));
            } else {
                result.push_str("   Could not auto-repair. Manual intervention needed.\n\n");
            }
        }
        result
    }

    /// Diagnose pasted error text: parse, surface known solutions, and
    /// optionally attempt repairs.
    pub async fn diagnose(&self, error_text: &str, auto_repair: bool) -> String {
        let language = detect::detect_language(&self.root);
        let mut events = parse_errors(error_text, language);
        if events.is_empty() {
            events.push(ErrorEvent::new("unknown", "", 0, error_text, ""));
        }

        let mut result = format!("Diagnosed {} error(s):\n\n", events.len());
        for (i, e) in events.iter().enumerate() {
            result.push_str(&format!("{}. Type: {}\n", i + 1, e.kind));
            if !e.file.is_empty() {
                result.push_str(&format!("   File: {}:{}\n", e.file, e.line));
            }
            result.push_str(&format!("   Message: {}\n", e.message));

            let patterns = self.knowledge.find_matching_patterns(&e.message, &self.scope(), 3);
            if !patterns.is_empty() {
                result.push_str("\n   Known solutions:\n");
                for p in &patterns {
                    result.push_str(&format!(
                        "   - {} (success rate: {}/{})\n",
                        p.solution,
                        p.success_count,
                        p.success_count + p.failure_count
                    ));
                }
            }

            if auto_repair {
                let repair = attempt_repair(e, self.knowledge.as_ref(), &self.scope()).await;
                if repair.success {
                    result.push_str(&format!("\n   AUTO-REPAIRED: {}\n", repair.solution));
                } else {
                    result.push_str("\n   Auto-repair failed or no solution found.\n");
                }
            }

            result.push('\n');
        }
        result
    }
}

/// Everything the loop task needs, detached from the service handle so a
/// subsequent stop/start cannot race with a cycle in flight.
struct LoopState {
    config: WatchConfig,
    language: String,
    scope: String,
    knowledge: Arc<dyn KnowledgeStore>,
    last_build: Arc<Mutex<String>>,
    error_history: Arc<Mutex<VecDeque<ErrorEvent>>>,
    repair_history: Arc<Mutex<VecDeque<RepairResult>>>,
}

async fn run_loop(state: LoopState, cancel_token: CancellationToken) {
    run_cycle(&state).await;

    let mut ticker = tokio::time::interval(CYCLE_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = ticker.tick() => run_cycle(&state).await,
        }
    }
}

async fn run_cycle(state: &LoopState) {
    *state.last_build.lock().unwrap() = chrono::Utc::now().to_rfc3339();

    let exec = execute_shell(&state.config.build_command, None, BUILD_TIMEOUT).await;
    if !exec.success() {
        let events = parse_errors(&exec.combined_output(), &state.language);
        for e in events {
            push_capped(&state.error_history, e.clone());
            tracing::info!(file = %e.file, line = e.line, message = %e.message, "Build error detected");

            let repair = attempt_repair(&e, state.knowledge.as_ref(), &state.scope).await;
            if repair.success {
                tracing::info!(solution = %repair.solution, "Auto-repair succeeded");
            }
            push_capped(&state.repair_history, repair);
        }
    }

    if !state.config.test_command.is_empty() {
        let exec = execute_shell(&state.config.test_command, None, BUILD_TIMEOUT).await;
        if !exec.success() {
            // Test failures are recorded but never auto-repaired.
            let events = parse_errors(&exec.combined_output(), &state.language);
            for mut e in events {
                e.kind = "test".to_string();
                push_capped(&state.error_history, e);
            }
        }
    }
}

fn push_capped<T>(history: &Arc<Mutex<VecDeque<T>>>, item: T) {
    let mut history = history.lock().unwrap();
    if history.len() >= HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::MemoryKnowledge;
    use tempfile::tempdir;

    fn service(root: PathBuf) -> WatchService {
        WatchService::new(Arc::new(MemoryKnowledge::new()), root)
    }

    #[tokio::test]
    async fn stop_without_watcher_is_informational() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path().to_path_buf());
        assert_eq!(svc.stop(), "No watcher running.");
        assert_eq!(svc.status(), "No watcher running. Use start_watch to begin.");
    }

    #[tokio::test]
    async fn start_reports_effective_config() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module x").unwrap();
        let svc = service(dir.path().to_path_buf());

        let started = svc.start(Vec::new(), Some("true".into()), Some(String::new()));
        assert!(started.starts_with("Watch mode started"));
        assert!(started.contains("Build command: true"));
        assert!(started.contains("Watching patterns: [*.go]"));

        svc.stop();
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_touching_state() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path().to_path_buf());

        svc.start(vec!["*.c".into()], Some("true".into()), None);
        let second = svc.start(vec!["*.h".into()], Some("false".into()), None);
        assert_eq!(second, "Watcher already running. Use stop_watch first.");

        // Original watcher still active with its original config.
        assert!(svc.status().contains("Build command: true"));
        assert!(svc.stop().starts_with("Watcher stopped."));
    }

    #[tokio::test]
    async fn stop_reports_session_totals() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path().to_path_buf());
        svc.start(Vec::new(), Some("true".into()), None);
        let stopped = svc.stop();
        assert!(stopped.starts_with("Watcher stopped. Detected "));
        assert!(stopped.ends_with("repairs during session."));
    }

    #[tokio::test]
    async fn trigger_build_success_and_failure() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path().to_path_buf());

        let ok = svc.trigger_build(Some("echo done".into())).await;
        assert!(ok.starts_with("Build successful:"));
        assert!(ok.contains("done"));

        let failed = svc.trigger_build(Some("exit 1".into())).await;
        assert!(failed.starts_with("Build failed"));
    }

    #[test]
    fn history_cap_drops_oldest_entries() {
        let history = Arc::new(Mutex::new(VecDeque::new()));
        for i in 0..HISTORY_CAP + 5 {
            push_capped(&history, i);
        }
        let history = history.lock().unwrap();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(*history.front().unwrap(), 5);
        assert_eq!(*history.back().unwrap(), HISTORY_CAP + 4);
    }

    #[tokio::test]
    async fn diagnose_unparsable_text_falls_back_to_unknown() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path().to_path_buf());
        let report = svc.diagnose("something exploded", false).await;
        assert!(report.starts_with("Diagnosed 1 error(s):"));
        assert!(report.contains("Type: unknown"));
        assert!(report.contains("Message: something exploded"));
    }

    #[tokio::test]
    async fn diagnose_surfaces_known_solutions() {
        let dir = tempdir().unwrap();
        let knowledge = Arc::new(MemoryKnowledge::new());
        knowledge.record_error_pattern("exploded", "runtime", "", "restart it", "", "");
        let svc = WatchService::new(knowledge, dir.path().to_path_buf());

        let report = svc.diagnose("something exploded", false).await;
        assert!(report.contains("Known solutions:"));
        assert!(report.contains("restart it (success rate: 0/0)"));
    }
}
