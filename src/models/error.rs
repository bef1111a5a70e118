//! Test failure signalling
//!
//! Hooks, test bodies, fixture constructors and disposal all return
//! [`TestResult`]. The error variant decides how the engine classifies
//! the attempt.

use std::time::Duration;
use thiserror::Error;

/// Result type returned by hooks, bodies and fixtures
pub type TestResult<T = ()> = std::result::Result<T, TestError>;

/// Failure raised while executing a test
#[derive(Debug, Error)]
pub enum TestError {
    /// Cooperative skip signal. Never retried.
    #[error("skipped: {0}")]
    Skip(String),

    /// Expected test-logic failure (reported as Failed)
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The attempt exceeded its configured timeout
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The attempt observed cancellation
    #[error("run cancelled")]
    Cancelled,

    /// Fault that terminates the whole run
    #[error("critical fault: {0}")]
    Critical(String),

    /// Any other failure from a hook, body, constructor or disposal
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl TestError {
    pub fn skip(reason: impl Into<String>) -> Self {
        TestError::Skip(reason.into())
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        TestError::Assertion(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        TestError::Runtime(anyhow::anyhow!(message.into()))
    }

    pub fn critical(message: impl Into<String>) -> Self {
        TestError::Critical(message.into())
    }

    /// Whether an exhausted attempt with this error reports Failed rather than Error
    pub fn is_assertion(&self) -> bool {
        matches!(self, TestError::Assertion(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TestError::Skip(_))
    }

    /// Short machine-readable kind, used by sinks and stored results
    pub fn kind(&self) -> &'static str {
        match self {
            TestError::Skip(_) => "skip",
            TestError::Assertion(_) => "assertion",
            TestError::Timeout(_) => "timeout",
            TestError::Cancelled => "cancelled",
            TestError::Critical(_) => "critical",
            TestError::Runtime(_) => "runtime",
        }
    }
}

/// Fail with an assertion error unless `condition` holds
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(TestError::assertion(message))
    }
}
