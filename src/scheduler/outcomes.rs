//! Outcome table
//!
//! Thread-safe record of reported outcomes, written at most once per test.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::models::{TestCaseId, TestOutcome};

/// Outcomes reported so far in one run
#[derive(Debug, Default)]
pub struct OutcomeTable {
    entries: Mutex<HashMap<TestCaseId, TestOutcome>>,
}

impl OutcomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Returns `false` if the test already had one (first writer wins).
    pub fn record(&self, id: &TestCaseId, outcome: TestOutcome) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.clone(), outcome);
        true
    }

    pub fn get(&self, id: &TestCaseId) -> Option<TestOutcome> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    pub fn contains(&self, id: &TestCaseId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let table = OutcomeTable::new();
        let id = TestCaseId::from("a");

        assert!(table.record(&id, TestOutcome::Failed));
        assert!(!table.record(&id, TestOutcome::Passed));
        assert_eq!(table.get(&id), Some(TestOutcome::Failed));
        assert_eq!(table.len(), 1);
        assert!(!table.contains(&TestCaseId::from("b")));
    }
}
