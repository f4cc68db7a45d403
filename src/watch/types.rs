//! Shared types for the watch subsystem.

use serde::Serialize;

/// A single diagnostic extracted from build or test output.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEvent {
    /// Diagnostic class: compile, syntax, test, unknown.
    pub kind: String,
    /// Source file, when the parser could attribute one. Empty otherwise.
    pub file: String,
    /// 1-based line number; 0 when unattributed.
    pub line: u32,
    pub message: String,
    /// Raw tool output, kept only for unattributed diagnostics.
    pub full_output: String,
    /// Language the parser ran as (go, rust, typescript, python); empty for
    /// the generic fallback.
    pub language: String,
    /// ISO 8601 timestamp of detection.
    pub detected_at: String,
}

impl ErrorEvent {
    pub fn new(kind: &str, file: &str, line: u32, message: &str, language: &str) -> Self {
        Self {
            kind: kind.to_string(),
            file: file.to_string(),
            line,
            message: message.to_string(),
            full_output: String::new(),
            language: language.to_string(),
            detected_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of one repair attempt against an [`ErrorEvent`].
#[derive(Clone, Debug, Serialize)]
pub struct RepairResult {
    pub error: ErrorEvent,
    pub success: bool,
    /// Number of distinct fixes tried (pattern command, then heuristics).
    pub attempts: u32,
    /// Description of the fix that succeeded, if any.
    pub solution: String,
    /// The command that was run, if any.
    pub command: String,
    /// Output of the last fix command.
    pub output: String,
    pub duration_ms: u64,
}

/// Effective watcher configuration after auto-detection fills the gaps.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Glob-style file patterns being watched.
    pub patterns: Vec<String>,
    pub build_command: String,
    /// Empty when no test runner was detected or configured.
    pub test_command: String,
}
