//! The watch loop end to end: detect a build error, repair it from a learned
//! pattern, and report session totals.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use quill::knowledge::{KnowledgeStore, MemoryKnowledge};
use quill::watch::WatchService;

#[tokio::test]
async fn failing_build_triggers_pattern_repair() {
    let root = TempDir::new().unwrap();
    let flag = root.path().join("repaired.flag");

    let knowledge = Arc::new(MemoryKnowledge::new());
    knowledge.record_error_pattern(
        "error: boom",
        "build",
        "",
        "touch the flag",
        &format!("touch {}", flag.display()),
        "",
    );

    let svc = WatchService::new(knowledge.clone(), root.path().to_path_buf());
    svc.start(
        vec!["*".into()],
        Some("echo 'error: boom' >&2; exit 1".into()),
        Some(String::new()),
    );

    // The first cycle runs immediately; give it time to build and repair.
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(flag.exists(), "repair command did not run");

    let status = svc.status();
    assert!(status.contains("Watch Mode Status: ACTIVE"));
    assert!(status.contains("Errors detected: "));
    assert!(status.contains("Repair success rate: 100.0%"));

    let pattern = &knowledge.find_matching_patterns("error: boom", "", 1)[0];
    assert!(pattern.success_count >= 1);
    assert_eq!(pattern.failure_count, 0);

    let stopped = svc.stop();
    assert!(stopped.starts_with("Watcher stopped. Detected "));
}

#[tokio::test]
async fn trigger_build_reports_auto_repair() {
    let root = TempDir::new().unwrap();
    let knowledge = Arc::new(MemoryKnowledge::new());
    knowledge.record_error_pattern("error: boom", "build", "", "rerun make", "true", "");

    let svc = WatchService::new(knowledge, root.path().to_path_buf());
    let report = svc
        .trigger_build(Some("echo 'error: boom'; exit 1".into()))
        .await;

    assert!(report.starts_with("Build failed with 1 error(s):"));
    assert!(report.contains("AUTO-REPAIRED: rerun make"));
}
