//! Project auto-detection via marker files.
//!
//! The watcher and build tools fill unset configuration from whatever build
//! system the project root advertises. First marker wins, checked in a fixed
//! order: go.mod, Cargo.toml, package.json, requirements.txt, Makefile.

use std::path::Path;

pub fn detect_language(root: &Path) -> &'static str {
    if root.join("go.mod").exists() {
        "go"
    } else if root.join("Cargo.toml").exists() {
        "rust"
    } else if root.join("package.json").exists() {
        "javascript"
    } else if root.join("requirements.txt").exists() {
        "python"
    } else {
        "unknown"
    }
}

pub fn detect_build_command(root: &Path) -> String {
    if root.join("go.mod").exists() {
        "go build ./...".to_string()
    } else if root.join("Cargo.toml").exists() {
        "cargo build".to_string()
    } else if root.join("package.json").exists() {
        if root.join("node_modules/.bin/tsc").exists() {
            "npx tsc --noEmit".to_string()
        } else {
            "npm run build".to_string()
        }
    } else if root.join("requirements.txt").exists() {
        "python -m py_compile *.py".to_string()
    } else if root.join("Makefile").exists() {
        "make".to_string()
    } else {
        "echo 'No build command detected'".to_string()
    }
}

/// Empty string means no test runner was detected.
pub fn detect_test_command(root: &Path) -> String {
    if root.join("go.mod").exists() {
        "go test ./...".to_string()
    } else if root.join("Cargo.toml").exists() {
        "cargo test".to_string()
    } else if root.join("package.json").exists() {
        "npm test".to_string()
    } else if root.join("pytest.ini").exists() {
        "pytest".to_string()
    } else {
        String::new()
    }
}

pub fn detect_watch_patterns(root: &Path) -> Vec<String> {
    let patterns: &[&str] = if root.join("go.mod").exists() {
        &["*.go"]
    } else if root.join("Cargo.toml").exists() {
        &["*.rs"]
    } else if root.join("package.json").exists() {
        &["*.js", "*.ts", "*.jsx", "*.tsx"]
    } else if root.join("requirements.txt").exists() {
        &["*.py"]
    } else {
        &["*"]
    };
    patterns.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn go_project_detection() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "go.mod");
        assert_eq!(detect_language(dir.path()), "go");
        assert_eq!(detect_build_command(dir.path()), "go build ./...");
        assert_eq!(detect_test_command(dir.path()), "go test ./...");
        assert_eq!(detect_watch_patterns(dir.path()), vec!["*.go"]);
    }

    #[test]
    fn rust_project_detection() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "Cargo.toml");
        assert_eq!(detect_language(dir.path()), "rust");
        assert_eq!(detect_build_command(dir.path()), "cargo build");
        assert_eq!(detect_test_command(dir.path()), "cargo test");
    }

    #[test]
    fn node_project_without_tsc_uses_npm_build() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "package.json");
        assert_eq!(detect_build_command(dir.path()), "npm run build");
        assert_eq!(
            detect_watch_patterns(dir.path()),
            vec!["*.js", "*.ts", "*.jsx", "*.tsx"]
        );
    }

    #[test]
    fn go_marker_wins_over_later_markers() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "go.mod");
        touch(dir.path(), "Cargo.toml");
        assert_eq!(detect_language(dir.path()), "go");
    }

    #[test]
    fn bare_directory_falls_back() {
        let dir = tempdir().unwrap();
        assert_eq!(detect_language(dir.path()), "unknown");
        assert_eq!(detect_build_command(dir.path()), "echo 'No build command detected'");
        assert_eq!(detect_test_command(dir.path()), "");
        assert_eq!(detect_watch_patterns(dir.path()), vec!["*"]);
    }
}
