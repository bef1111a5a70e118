//! Test batches
//!
//! A batch is the unit the scheduler hands to the executor: tests that may
//! start together under one concurrency rule.

use std::fmt;
use std::sync::Arc;

use crate::models::TestCaseDescriptor;

/// How a batch was formed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    /// Cascade-skipped dependents
    Skip,
    /// All ready members of one exclusive group
    Exclusive,
    /// A single not-in-parallel test without constraint keys
    Serial,
    /// A single member of a constraint-key cluster
    Constrained,
    /// Unconstrained tests sharing a concurrency cap
    Parallel,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchKind::Skip => "skip",
            BatchKind::Exclusive => "exclusive",
            BatchKind::Serial => "serial",
            BatchKind::Constrained => "constrained",
            BatchKind::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

/// Immutable group of tests to run together
#[derive(Clone, Debug)]
pub struct TestBatch {
    kind: BatchKind,
    tests: Vec<Arc<TestCaseDescriptor>>,
    concurrency: usize,
    serial: bool,
    exclusive_group: Option<String>,
    constraint_keys: Vec<String>,
}

impl TestBatch {
    /// Batch that only reports cascade-skips
    pub fn skip(tests: Vec<Arc<TestCaseDescriptor>>) -> Self {
        Self {
            kind: BatchKind::Skip,
            tests,
            concurrency: 1,
            serial: true,
            exclusive_group: None,
            constraint_keys: Vec::new(),
        }
    }

    pub fn exclusive(
        group: impl Into<String>,
        tests: Vec<Arc<TestCaseDescriptor>>,
        concurrency: usize,
        constraint_keys: Vec<String>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            kind: BatchKind::Exclusive,
            tests,
            concurrency,
            serial: concurrency == 1,
            exclusive_group: Some(group.into()),
            constraint_keys,
        }
    }

    pub fn serial(test: Arc<TestCaseDescriptor>) -> Self {
        Self {
            kind: BatchKind::Serial,
            tests: vec![test],
            concurrency: 1,
            serial: true,
            exclusive_group: None,
            constraint_keys: Vec::new(),
        }
    }

    pub fn constrained(test: Arc<TestCaseDescriptor>, constraint_keys: Vec<String>) -> Self {
        Self {
            kind: BatchKind::Constrained,
            tests: vec![test],
            concurrency: 1,
            serial: true,
            exclusive_group: None,
            constraint_keys,
        }
    }

    pub fn parallel(tests: Vec<Arc<TestCaseDescriptor>>, concurrency: usize) -> Self {
        Self {
            kind: BatchKind::Parallel,
            tests,
            concurrency: concurrency.max(1),
            serial: false,
            exclusive_group: None,
            constraint_keys: Vec::new(),
        }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn tests(&self) -> &[Arc<TestCaseDescriptor>] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Maximum tests running at once inside this batch
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Tests must run one after another
    pub fn is_serial(&self) -> bool {
        self.serial
    }

    pub fn is_skip_batch(&self) -> bool {
        self.kind == BatchKind::Skip
    }

    pub fn exclusive_group(&self) -> Option<&str> {
        self.exclusive_group.as_deref()
    }

    pub fn constraint_keys(&self) -> &[String] {
        &self.constraint_keys
    }
}

impl fmt::Display for TestBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batch: {} test(s), concurrency {}",
            self.kind,
            self.tests.len(),
            self.concurrency
        )?;
        if let Some(group) = &self.exclusive_group {
            write!(f, ", group '{group}'")?;
        }
        if !self.constraint_keys.is_empty() {
            write!(f, ", keys [{}]", self.constraint_keys.join(", "))?;
        }
        Ok(())
    }
}
