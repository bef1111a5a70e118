//! In-memory result collection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::info;

use super::{Report, ResultSink};
use crate::models::{RunSummary, TestCaseDescriptor, TestCaseId, TestError, TestOutcome, TestRecord};

/// Sink that keeps every record in report order
pub struct CollectingSink {
    records: Mutex<Vec<TestRecord>>,
    started_at: DateTime<Utc>,
    start: Instant,
    echo: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            started_at: Utc::now(),
            start: Instant::now(),
            echo: false,
        }
    }

    /// Log each record as it arrives
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn push(&self, record: TestRecord) {
        if self.echo {
            info!("  {}", record);
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<TestRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn outcome_of(&self, id: &TestCaseId) -> Option<TestOutcome> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.outcome)
    }

    /// Summary of everything collected so far
    pub fn summary(&self, suite: impl Into<String>) -> RunSummary {
        RunSummary::new(
            suite,
            self.records(),
            self.started_at,
            self.start.elapsed().as_millis() as u64,
        )
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultSink for CollectingSink {
    async fn report_passed(&self, test: &TestCaseDescriptor, report: Report) -> anyhow::Result<()> {
        let record = TestRecord::passed(test, report.duration_ms())
            .with_output(report.output)
            .with_artifacts(report.artifacts);
        self.push(record);
        Ok(())
    }

    async fn report_failed(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()> {
        let record = TestRecord::failed(test, report.duration_ms(), error.to_string())
            .with_error_kind(error.kind())
            .with_output(report.output)
            .with_artifacts(report.artifacts);
        self.push(record);
        Ok(())
    }

    async fn report_error(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()> {
        let record = TestRecord::error(test, report.duration_ms(), format!("{error:#}"))
            .with_error_kind(error.kind())
            .with_output(report.output)
            .with_artifacts(report.artifacts);
        self.push(record);
        Ok(())
    }

    async fn report_skipped(
        &self,
        test: &TestCaseDescriptor,
        reason: &str,
        report: Report,
    ) -> anyhow::Result<()> {
        let record = TestRecord::skipped(test, reason).with_output(report.output);
        self.push(record);
        Ok(())
    }
}
