//! Test outcome models
//!
//! Defines the outcome enum, per-test records and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::Artifact;
use super::descriptor::{TestCaseDescriptor, TestCaseId};

/// Final outcome of a test case
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    NotRun,
    Skipped,
    Passed,
    Failed,
    Error,
}

impl TestOutcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestOutcome::NotRun => "-",
            TestOutcome::Skipped => "○",
            TestOutcome::Passed => "✓",
            TestOutcome::Failed => "✗",
            TestOutcome::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    /// Failed or Error
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Failed | TestOutcome::Error)
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::NotRun => write!(f, "NOT RUN"),
            TestOutcome::Skipped => write!(f, "SKIP"),
            TestOutcome::Passed => write!(f, "PASS"),
            TestOutcome::Failed => write!(f, "FAIL"),
            TestOutcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Reported result of a single test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: TestCaseId,
    pub display_name: String,
    pub class_name: String,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    pub message: Option<String>,
    pub error_kind: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl TestRecord {
    fn new(test: &TestCaseDescriptor, outcome: TestOutcome, duration_ms: u64) -> Self {
        Self {
            id: test.id.clone(),
            display_name: test.display_name.clone(),
            class_name: test.class.name().to_string(),
            outcome,
            duration_ms,
            message: None,
            error_kind: None,
            output: None,
            artifacts: Vec::new(),
        }
    }

    pub fn passed(test: &TestCaseDescriptor, duration_ms: u64) -> Self {
        Self::new(test, TestOutcome::Passed, duration_ms)
    }

    pub fn failed(test: &TestCaseDescriptor, duration_ms: u64, message: impl Into<String>) -> Self {
        Self::new(test, TestOutcome::Failed, duration_ms).with_message(message)
    }

    pub fn skipped(test: &TestCaseDescriptor, reason: impl Into<String>) -> Self {
        Self::new(test, TestOutcome::Skipped, 0).with_message(reason)
    }

    pub fn error(test: &TestCaseDescriptor, duration_ms: u64, error: impl Into<String>) -> Self {
        Self::new(test, TestOutcome::Error, duration_ms).with_message(error)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    pub fn with_output(mut self, output: Option<String>) -> Self {
        self.output = output;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

impl fmt::Display for TestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{} [{}ms]",
            self.outcome.symbol(),
            self.class_name,
            self.display_name,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    pub results: Vec<TestRecord>,
}

impl RunSummary {
    pub fn new(
        suite: impl Into<String>,
        results: Vec<TestRecord>,
        started_at: DateTime<Utc>,
        total_duration_ms: u64,
    ) -> Self {
        let count = |outcome: TestOutcome| results.iter().filter(|r| r.outcome == outcome).count();

        Self {
            suite: suite.into(),
            total: results.len(),
            passed: count(TestOutcome::Passed),
            failed: count(TestOutcome::Failed),
            skipped: count(TestOutcome::Skipped),
            errors: count(TestOutcome::Error),
            total_duration_ms,
            started_at,
            completed_at: Utc::now(),
            cancelled: false,
            results,
        }
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Percentage of executed (non-skipped) tests that passed
    pub fn pass_rate(&self) -> f64 {
        let executed = self.total - self.skipped;
        if executed == 0 {
            0.0
        } else {
            (self.passed as f64 / executed as f64) * 100.0
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errors > 0
    }

    pub fn record(&self, id: &TestCaseId) -> Option<&TestRecord> {
        self.results.iter().find(|r| &r.id == id)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite: {}", self.suite)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
