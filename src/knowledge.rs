//! Knowledge collaborator: learned error patterns and environment facts.
//!
//! The repair loop and the knowledge tools talk to storage through the
//! [`KnowledgeStore`] trait; [`MemoryKnowledge`] is the in-process
//! implementation used by default wiring and tests. Pattern matching is a
//! bidirectional substring check -- a stored signature matches an error if
//! either contains the other -- with results ordered by how often the
//! pattern's fix has worked before.

use std::sync::Mutex;

use serde::Serialize;

/// A learned error signature with its remembered fix.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorPattern {
    pub id: i64,
    /// Normalized key text identifying the error.
    pub signature: String,
    /// Broad class: compile, runtime, test, build, dependency.
    pub error_type: String,
    pub language: String,
    /// Human-readable description of the fix.
    pub solution: String,
    /// Shell command that applies the fix, if one is known.
    pub solution_command: String,
    pub success_count: u64,
    pub failure_count: u64,
    /// Project path this pattern is scoped to; empty means global.
    pub scope: String,
}

/// A subject-predicate-object fact about the environment.
#[derive(Clone, Debug, Serialize)]
pub struct Fact {
    /// Category: system, preference, pattern, solution.
    pub category: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Project path this fact is scoped to; empty means global.
    pub scope: String,
}

/// Storage contract between the repair loop / knowledge tools and whatever
/// backs them.
pub trait KnowledgeStore: Send + Sync {
    /// Patterns matching `error_text`, scoped to `scope` (global patterns
    /// always match), best-performing first, at most `limit`.
    fn find_matching_patterns(&self, error_text: &str, scope: &str, limit: usize)
        -> Vec<ErrorPattern>;

    /// Record whether applying pattern `id`'s fix worked.
    fn record_pattern_result(&self, id: i64, success: bool);

    /// Store a new error pattern (or refresh an existing signature within the
    /// same scope), returning its id.
    fn record_error_pattern(
        &self,
        signature: &str,
        error_type: &str,
        language: &str,
        solution: &str,
        solution_command: &str,
        scope: &str,
    ) -> i64;

    /// Insert or overwrite a fact keyed by (category, subject, predicate,
    /// scope).
    fn upsert_fact(&self, category: &str, subject: &str, predicate: &str, object: &str, scope: &str);

    /// Facts whose subject, predicate, or object contains `query`
    /// (case-insensitive), scoped like pattern matching, at most `limit`.
    fn recall(&self, query: &str, scope: &str, limit: usize) -> Vec<Fact>;
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    patterns: Vec<ErrorPattern>,
    facts: Vec<Fact>,
}

/// In-memory [`KnowledgeStore`]. State lives only for the process lifetime.
#[derive(Default)]
pub struct MemoryKnowledge {
    inner: Mutex<MemoryInner>,
}

impl MemoryKnowledge {
    pub fn new() -> Self {
        Self::default()
    }
}

fn scope_matches(entry_scope: &str, scope: &str) -> bool {
    entry_scope.is_empty() || entry_scope == scope
}

fn signatures_match(signature: &str, error_text: &str) -> bool {
    error_text.contains(signature) || signature.contains(error_text)
}

impl KnowledgeStore for MemoryKnowledge {
    fn find_matching_patterns(
        &self,
        error_text: &str,
        scope: &str,
        limit: usize,
    ) -> Vec<ErrorPattern> {
        let inner = self.inner.lock().unwrap();
        let mut matches: Vec<ErrorPattern> = inner
            .patterns
            .iter()
            .filter(|p| scope_matches(&p.scope, scope) && signatures_match(&p.signature, error_text))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.success_count.cmp(&a.success_count));
        matches.truncate(limit);
        matches
    }

    fn record_pattern_result(&self, id: i64, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pattern) = inner.patterns.iter_mut().find(|p| p.id == id) {
            if success {
                pattern.success_count += 1;
            } else {
                pattern.failure_count += 1;
            }
        }
    }

    fn record_error_pattern(
        &self,
        signature: &str,
        error_type: &str,
        language: &str,
        solution: &str,
        solution_command: &str,
        scope: &str,
    ) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .patterns
            .iter_mut()
            .find(|p| p.signature == signature && p.scope == scope)
        {
            // Refresh fix details; keep the learned success/failure counters.
            if !solution.is_empty() {
                existing.solution = solution.to_string();
            }
            if !solution_command.is_empty() {
                existing.solution_command = solution_command.to_string();
            }
            existing.error_type = error_type.to_string();
            existing.language = language.to_string();
            return existing.id;
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.patterns.push(ErrorPattern {
            id,
            signature: signature.to_string(),
            error_type: error_type.to_string(),
            language: language.to_string(),
            solution: solution.to_string(),
            solution_command: solution_command.to_string(),
            success_count: 0,
            failure_count: 0,
            scope: scope.to_string(),
        });
        id
    }

    fn upsert_fact(
        &self,
        category: &str,
        subject: &str,
        predicate: &str,
        object: &str,
        scope: &str,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.facts.iter_mut().find(|f| {
            f.category == category
                && f.subject == subject
                && f.predicate == predicate
                && f.scope == scope
        }) {
            existing.object = object.to_string();
            return;
        }
        inner.facts.push(Fact {
            category: category.to_string(),
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
            scope: scope.to_string(),
        });
    }

    fn recall(&self, query: &str, scope: &str, limit: usize) -> Vec<Fact> {
        let query = query.to_lowercase();
        let inner = self.inner.lock().unwrap();
        inner
            .facts
            .iter()
            .filter(|f| scope_matches(&f.scope, scope))
            .filter(|f| {
                f.subject.to_lowercase().contains(&query)
                    || f.predicate.to_lowercase().contains(&query)
                    || f.object.to_lowercase().contains(&query)
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pattern(signature: &str, command: &str) -> (MemoryKnowledge, i64) {
        let store = MemoryKnowledge::new();
        let id = store.record_error_pattern(signature, "compile", "rust", "fix it", command, "");
        (store, id)
    }

    #[test]
    fn matches_when_error_contains_signature() {
        let (store, _) = store_with_pattern("undefined: foo", "");
        let found = store.find_matching_patterns("main.go:10:2: undefined: foo", "", 5);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn matches_when_signature_contains_error() {
        let (store, _) = store_with_pattern("cannot find value `x` in this scope", "");
        let found = store.find_matching_patterns("cannot find value `x`", "", 5);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn unrelated_error_does_not_match() {
        let (store, _) = store_with_pattern("undefined: foo", "");
        assert!(store.find_matching_patterns("segmentation fault", "", 5).is_empty());
    }

    #[test]
    fn scoped_pattern_only_matches_its_scope() {
        let store = MemoryKnowledge::new();
        store.record_error_pattern("missing dep", "build", "", "", "", "/proj/a");
        assert_eq!(store.find_matching_patterns("missing dep", "/proj/a", 5).len(), 1);
        assert!(store.find_matching_patterns("missing dep", "/proj/b", 5).is_empty());
        // Global patterns match any scope.
        store.record_error_pattern("missing dep", "build", "", "", "", "");
        assert_eq!(store.find_matching_patterns("missing dep", "/proj/b", 5).len(), 1);
    }

    #[test]
    fn results_ordered_by_success_count() {
        let store = MemoryKnowledge::new();
        let weak = store.record_error_pattern("timeout", "network", "", "", "retry", "");
        let strong = store.record_error_pattern("timeout error", "network", "", "", "wait", "");
        store.record_pattern_result(strong, true);
        store.record_pattern_result(strong, true);
        store.record_pattern_result(weak, true);

        let found = store.find_matching_patterns("timeout error in request", "", 5);
        assert_eq!(found[0].id, strong);
        assert_eq!(found[0].success_count, 2);
    }

    #[test]
    fn result_recording_increments_exactly_one_counter() {
        let (store, id) = store_with_pattern("oops", "");
        store.record_pattern_result(id, true);
        store.record_pattern_result(id, false);
        store.record_pattern_result(id, false);

        let found = store.find_matching_patterns("oops", "", 1);
        assert_eq!(found[0].success_count, 1);
        assert_eq!(found[0].failure_count, 2);
    }

    #[test]
    fn rerecording_signature_updates_in_place() {
        let (store, id) = store_with_pattern("oops", "old-fix");
        store.record_pattern_result(id, true);
        let id2 = store.record_error_pattern("oops", "compile", "rust", "", "new-fix", "");
        assert_eq!(id, id2);

        let found = store.find_matching_patterns("oops", "", 1);
        assert_eq!(found[0].solution_command, "new-fix");
        assert_eq!(found[0].success_count, 1);
    }

    #[test]
    fn fact_upsert_and_recall() {
        let store = MemoryKnowledge::new();
        store.upsert_fact("preference", "user", "prefers", "vim", "");
        store.upsert_fact("preference", "user", "prefers", "helix", "");
        store.upsert_fact("system", "project", "uses", "postgres", "/proj");

        let facts = store.recall("prefers", "", 10);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].object, "helix");

        let scoped = store.recall("postgres", "/proj", 10);
        assert_eq!(scoped.len(), 1);
        assert!(store.recall("postgres", "/other", 10).is_empty());
    }
}
