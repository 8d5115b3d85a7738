//! Child status tracking for workflow composites.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

/// Lifecycle phase of a composite's child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildPhase {
    /// Not started yet.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Never ran (earlier failure, unmatched branch, or cancellation).
    Skipped,
}

/// Status of one child as tracked by its composite.
#[derive(Debug, Clone)]
pub struct ChildStatus {
    /// Current phase.
    pub phase: ChildPhase,
    /// When the child started running.
    pub start_time: Option<DateTime<Utc>>,
    /// When the child finished.
    pub end_time: Option<DateTime<Utc>>,
    /// The failure message, when failed.
    pub error: Option<String>,
}

impl ChildStatus {
    fn pending() -> Self {
        Self {
            phase: ChildPhase::Pending,
            start_time: None,
            end_time: None,
            error: None,
        }
    }
}

/// The status table a composite maintains for its children.
///
/// Mutated only by the composite itself; observers read snapshots via
/// [`StatusBoard::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<RwLock<HashMap<String, ChildStatus>>>,
}

impl StatusBoard {
    /// Create a board with every child pending.
    #[must_use]
    pub fn new<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = children
            .into_iter()
            .map(|name| (name.into(), ChildStatus::pending()))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Reset every child to pending, for a fresh run.
    pub fn reset(&self) {
        let mut entries = self.entries.write().expect("status board poisoned");
        for status in entries.values_mut() {
            *status = ChildStatus::pending();
        }
    }

    /// Mark a child running.
    pub fn mark_running(&self, name: &str) {
        self.update(name, |status| {
            status.phase = ChildPhase::Running;
            status.start_time = Some(Utc::now());
            status.end_time = None;
            status.error = None;
        });
    }

    /// Mark a child completed.
    pub fn mark_completed(&self, name: &str) {
        self.update(name, |status| {
            status.phase = ChildPhase::Completed;
            status.end_time = Some(Utc::now());
        });
    }

    /// Mark a child failed.
    pub fn mark_failed(&self, name: &str, error: &str) {
        self.update(name, |status| {
            status.phase = ChildPhase::Failed;
            status.end_time = Some(Utc::now());
            status.error = Some(error.to_string());
        });
    }

    /// Mark a child skipped.
    pub fn mark_skipped(&self, name: &str) {
        self.update(name, |status| {
            if matches!(status.phase, ChildPhase::Pending | ChildPhase::Running) {
                status.phase = ChildPhase::Skipped;
            }
        });
    }

    fn update(&self, name: &str, apply: impl FnOnce(&mut ChildStatus)) {
        let mut entries = self.entries.write().expect("status board poisoned");
        let status = entries
            .entry(name.to_string())
            .or_insert_with(ChildStatus::pending);
        apply(status);
    }

    /// A snapshot of every child's status.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, ChildStatus> {
        self.entries.read().expect("status board poisoned").clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_record_timestamps() {
        let board = StatusBoard::new(["a", "b"]);
        assert_eq!(board.snapshot()["a"].phase, ChildPhase::Pending);

        board.mark_running("a");
        let running = board.snapshot();
        assert_eq!(running["a"].phase, ChildPhase::Running);
        assert!(running["a"].start_time.is_some());

        board.mark_completed("a");
        let done = board.snapshot();
        assert_eq!(done["a"].phase, ChildPhase::Completed);
        assert!(done["a"].end_time.is_some());
    }

    #[test]
    fn failed_children_carry_the_error() {
        let board = StatusBoard::new(["a"]);
        board.mark_running("a");
        board.mark_failed("a", "exploded");
        assert_eq!(board.snapshot()["a"].error.as_deref(), Some("exploded"));
    }

    #[test]
    fn skip_does_not_override_terminal_phases() {
        let board = StatusBoard::new(["a"]);
        board.mark_running("a");
        board.mark_completed("a");
        board.mark_skipped("a");
        assert_eq!(board.snapshot()["a"].phase, ChildPhase::Completed);
    }

    #[test]
    fn reset_returns_children_to_pending() {
        let board = StatusBoard::new(["a"]);
        board.mark_running("a");
        board.mark_failed("a", "x");
        board.reset();
        assert_eq!(board.snapshot()["a"].phase, ChildPhase::Pending);
        assert!(board.snapshot()["a"].error.is_none());
    }
}
