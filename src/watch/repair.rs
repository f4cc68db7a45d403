//! Auto-repair: learned pattern fixes first, then language heuristics.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::exec::execute_shell;
use crate::knowledge::KnowledgeStore;

use super::types::{ErrorEvent, RepairResult};

/// Bound on any single fix command.
const FIX_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

fn js_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Cannot find module '([^']+)'").unwrap())
}

fn py_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"No module named '([^']+)'").unwrap())
}

/// Try to repair one diagnostic.
///
/// The best-performing matching pattern with a stored command is tried first,
/// and its outcome is fed back into the store so future lookups rank it
/// accordingly. If no pattern applies, falls back to module-install
/// heuristics for missing JS/Python dependencies.
pub async fn attempt_repair(
    event: &ErrorEvent,
    knowledge: &dyn KnowledgeStore,
    scope: &str,
) -> RepairResult {
    let start = Instant::now();
    let mut result = RepairResult {
        error: event.clone(),
        success: false,
        attempts: 0,
        solution: String::new(),
        command: String::new(),
        output: String::new(),
        duration_ms: 0,
    };

    let patterns = knowledge.find_matching_patterns(&event.message, scope, 1);
    if let Some(pattern) = patterns.first() {
        if !pattern.solution_command.is_empty() {
            result.attempts += 1;
            let exec = execute_shell(&pattern.solution_command, None, FIX_COMMAND_TIMEOUT).await;
            result.output = exec.combined_output();

            knowledge.record_pattern_result(pattern.id, exec.success());
            if exec.success() {
                result.success = true;
                result.solution = pattern.solution.clone();
                result.command = pattern.solution_command.clone();
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        }
    }

    if let Some(command) = heuristic_fix_command(event) {
        result.attempts += 1;
        let exec = execute_shell(&command, None, FIX_COMMAND_TIMEOUT).await;
        result.output = exec.combined_output();
        if exec.success() {
            result.success = true;
            result.solution = "Installed missing module".to_string();
            result.command = command;
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

/// Known fix for a diagnostic without a stored pattern, if any.
fn heuristic_fix_command(event: &ErrorEvent) -> Option<String> {
    match event.language.as_str() {
        "javascript" | "typescript" => js_module_re()
            .captures(&event.message)
            .map(|caps| format!("npm install {}", &caps[1])),
        "python" => py_module_re()
            .captures(&event.message)
            .map(|caps| format!("pip install {}", &caps[1])),
        _ => None,
    }
}
