//! Language-specific diagnostic parsers for build/test output.

use std::sync::OnceLock;

use regex::Regex;

use crate::text::truncate;

use super::types::ErrorEvent;

fn go_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+\.go):(\d+):(\d+):\s*(.+)$").unwrap())
}

fn rust_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"error\[E\d+\]:\s*(.+)\n\s*-->\s*(.+):(\d+):(\d+)").unwrap())
}

fn ts_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(.+\.tsx?)\((\d+),(\d+)\):\s*error\s+TS\d+:\s*(.+)").unwrap())
}

fn py_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"File "(.+)", line (\d+)"#).unwrap())
}

fn py_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]*Error):\s*(.+)").unwrap())
}

/// Parse tool output into structured diagnostics for the given language.
/// Unrecognized languages fall through to a generic whole-output check.
pub fn parse_errors(output: &str, language: &str) -> Vec<ErrorEvent> {
    match language {
        "go" => parse_go_errors(output),
        "rust" => parse_rust_errors(output),
        "javascript" | "typescript" => parse_ts_errors(output),
        "python" => parse_python_errors(output),
        _ => parse_generic_errors(output),
    }
}

/// `file.go:LINE:COL: message`, one diagnostic per line.
fn parse_go_errors(output: &str) -> Vec<ErrorEvent> {
    output
        .lines()
        .filter_map(|line| {
            let caps = go_error_re().captures(line)?;
            Some(ErrorEvent::new(
                "compile",
                &caps[1],
                caps[2].parse().unwrap_or(0),
                &caps[4],
                "go",
            ))
        })
        .collect()
}

/// `error[ENNNN]: message` followed by an `--> file:LINE:COL` locus line.
fn parse_rust_errors(output: &str) -> Vec<ErrorEvent> {
    rust_error_re()
        .captures_iter(output)
        .map(|caps| {
            ErrorEvent::new("compile", &caps[2], caps[3].parse().unwrap_or(0), &caps[1], "rust")
        })
        .collect()
}

/// `file.ts(LINE,COL): error TSNNNN: message`.
fn parse_ts_errors(output: &str) -> Vec<ErrorEvent> {
    ts_error_re()
        .captures_iter(output)
        .map(|caps| {
            ErrorEvent::new(
                "compile",
                &caps[1],
                caps[2].parse().unwrap_or(0),
                &caps[4],
                "typescript",
            )
        })
        .collect()
}

/// Traceback style: remember the most recent `File "...", line N` locus and
/// emit an event when an `XxxError: message` line follows it.
fn parse_python_errors(output: &str) -> Vec<ErrorEvent> {
    let mut errors = Vec::new();
    let mut last_file = String::new();
    let mut last_line: u32 = 0;

    for line in output.lines() {
        if let Some(caps) = py_file_re().captures(line) {
            last_file = caps[1].to_string();
            last_line = caps[2].parse().unwrap_or(0);
        }
        if let Some(caps) = py_error_re().captures(line.trim_start()) {
            if !last_file.is_empty() {
                let kind = if &caps[1] == "SyntaxError" { "syntax" } else { "runtime" };
                errors.push(ErrorEvent::new(kind, &last_file, last_line, &caps[2], "python"));
            }
        }
    }

    errors
}

/// Whole output becomes a single unattributed event if it mentions "error".
fn parse_generic_errors(output: &str) -> Vec<ErrorEvent> {
    if !output.to_lowercase().contains("error") {
        return Vec::new();
    }
    let mut event = ErrorEvent::new("unknown", "", 0, &truncate(output, 500), "");
    event.full_output = output.to_string();
    vec![event]
}
