//! Outcome-recording decorator
//!
//! Records each outcome in the run's [`OutcomeTable`] before forwarding it,
//! so the scheduler sees a dependency's outcome before its dependents are
//! planned. A second report for the same test is dropped.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{Report, ResultSink};
use crate::models::{TestCaseDescriptor, TestError, TestOutcome};
use crate::scheduler::OutcomeTable;

pub struct OutcomeRecordingSink {
    inner: Arc<dyn ResultSink>,
    outcomes: Arc<OutcomeTable>,
}

impl OutcomeRecordingSink {
    pub fn new(inner: Arc<dyn ResultSink>, outcomes: Arc<OutcomeTable>) -> Self {
        Self { inner, outcomes }
    }

    pub fn outcomes(&self) -> &Arc<OutcomeTable> {
        &self.outcomes
    }

    fn claim(&self, test: &TestCaseDescriptor, outcome: TestOutcome) -> bool {
        if self.outcomes.record(&test.id, outcome) {
            return true;
        }
        warn!("Dropping duplicate {} report for {}", outcome, test.id);
        false
    }

    pub async fn passed(&self, test: &TestCaseDescriptor, report: Report) {
        log_sink_error(test, self.report_passed(test, report).await);
    }

    pub async fn failed(&self, test: &TestCaseDescriptor, error: &TestError, report: Report) {
        log_sink_error(test, self.report_failed(test, error, report).await);
    }

    pub async fn error(&self, test: &TestCaseDescriptor, error: &TestError, report: Report) {
        log_sink_error(test, self.report_error(test, error, report).await);
    }

    pub async fn skipped(&self, test: &TestCaseDescriptor, reason: &str, report: Report) {
        log_sink_error(test, self.report_skipped(test, reason, report).await);
    }
}

fn log_sink_error(test: &TestCaseDescriptor, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!("Result sink failed for {}: {:#}", test.id, e);
    }
}

#[async_trait]
impl ResultSink for OutcomeRecordingSink {
    async fn report_passed(&self, test: &TestCaseDescriptor, report: Report) -> anyhow::Result<()> {
        if !self.claim(test, TestOutcome::Passed) {
            return Ok(());
        }
        self.inner.report_passed(test, report).await
    }

    async fn report_failed(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()> {
        if !self.claim(test, TestOutcome::Failed) {
            return Ok(());
        }
        self.inner.report_failed(test, error, report).await
    }

    async fn report_error(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()> {
        if !self.claim(test, TestOutcome::Error) {
            return Ok(());
        }
        self.inner.report_error(test, error, report).await
    }

    async fn report_skipped(
        &self,
        test: &TestCaseDescriptor,
        reason: &str,
        report: Report,
    ) -> anyhow::Result<()> {
        if !self.claim(test, TestOutcome::Skipped) {
            return Ok(());
        }
        self.inner.report_skipped(test, reason, report).await
    }
}
