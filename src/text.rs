//! Text helpers shared by tool responses and diagnostics.

/// Truncate to at most `max_chars` characters, appending "..." if anything
/// was cut. Cuts on a character boundary, never mid-codepoint.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789", 10), "0123456789");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn long_strings_get_ellipsis() {
        assert_eq!(truncate("0123456789abc", 10), "0123456789...");
    }

    #[test]
    fn multibyte_input_cuts_on_char_boundary() {
        let arrows = "→".repeat(20);
        let cut = truncate(&arrows, 10);
        assert_eq!(cut, format!("{}...", "→".repeat(10)));

        // A boundary that falls inside a codepoint byte-wise must not panic.
        let mixed = format!("err {}", "é".repeat(30));
        assert!(truncate(&mixed, 7).ends_with("..."));
    }
}
