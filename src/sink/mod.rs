//! Result sinks
//!
//! The engine reports every test exactly once through a [`ResultSink`].

mod collecting;
mod recording;

pub use collecting::CollectingSink;
pub use recording::OutcomeRecordingSink;

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{Artifact, TestCaseDescriptor, TestContext, TestError};

/// Payload attached to every report
#[derive(Clone, Debug, Default)]
pub struct Report {
    pub output: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub duration: Duration,
}

impl Report {
    /// Report for a test that never ran
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect output and artifacts of a finished attempt
    pub fn from_context(context: &TestContext, duration: Duration) -> Self {
        Self {
            output: context.captured_output(),
            artifacts: context.artifacts(),
            duration,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Receiver of test outcomes
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn report_passed(&self, test: &TestCaseDescriptor, report: Report) -> anyhow::Result<()>;

    /// Assertion-kind failure
    async fn report_failed(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()>;

    /// Any other error
    async fn report_error(
        &self,
        test: &TestCaseDescriptor,
        error: &TestError,
        report: Report,
    ) -> anyhow::Result<()>;

    async fn report_skipped(
        &self,
        test: &TestCaseDescriptor,
        reason: &str,
        report: Report,
    ) -> anyhow::Result<()>;
}
