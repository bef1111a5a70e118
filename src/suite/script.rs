//! Scripted test behavior
//!
//! Manifest tests and hooks carry a [`Script`] instead of code: sleep, write
//! some output, attach artifacts, then finish with a scripted result.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::{
    body, hook, Artifact, Constructor, ConstructorShape, FixtureRef, HookFn, Invocation,
    OutputWriter, TestBody, TestContext, TestError, TestFixture, TestResult,
};

/// Terminal result of a script
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptResult {
    #[default]
    Pass,
    Fail,
    Error,
    Skip,
    Critical,
}

/// Scripted behavior of a test body or hook
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub sleep_ms: u64,
    #[serde(default)]
    pub result: ScriptResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fail with an assertion on attempts `1..=fail_attempts`
    #[serde(default)]
    pub fail_attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl Script {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: ScriptResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_sleep(mut self, ms: u64) -> Self {
        self.sleep_ms = ms;
        self
    }

    pub fn with_fail_attempts(mut self, attempts: u32) -> Self {
        self.fail_attempts = attempts;
        self
    }

    pub fn with_output(mut self, line: impl Into<String>) -> Self {
        self.output.push(line.into());
        self
    }

    fn message_or(&self, default: &str) -> String {
        self.message.clone().unwrap_or_else(|| default.to_string())
    }

    /// Play the script against a fixture
    pub async fn play(&self, fixture: &FixtureRef, cancellation: &CancellationToken) -> TestResult {
        if self.sleep_ms > 0 {
            tokio::select! {
                _ = cancellation.cancelled() => return Err(TestError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.sleep_ms)) => {}
            }
        }

        let scripted = fixture.downcast_ref::<ScriptFixture>();
        let attempt = scripted.map_or(0, ScriptFixture::attempt);

        if let Some(writer) = scripted.and_then(ScriptFixture::writer) {
            for line in &self.output {
                writer.writeln(line);
            }
        }
        for artifact in &self.artifacts {
            match scripted.and_then(|f| f.context.as_ref()) {
                Some(context) => context.attach(artifact.clone()),
                None => debug!("No context to attach {}", artifact.path.display()),
            }
        }

        if attempt > 0 && attempt <= self.fail_attempts {
            return Err(TestError::assertion(format!(
                "scripted failure on attempt {attempt}"
            )));
        }

        match self.result {
            ScriptResult::Pass => Ok(()),
            ScriptResult::Fail => Err(TestError::assertion(self.message_or("scripted failure"))),
            ScriptResult::Error => Err(TestError::runtime(self.message_or("scripted error"))),
            ScriptResult::Skip => Err(TestError::skip(self.message_or("scripted skip"))),
            ScriptResult::Critical => Err(TestError::critical(self.message_or("scripted critical fault"))),
        }
    }

    pub fn into_body(self) -> TestBody {
        let script = Arc::new(self);
        body(move |invocation: Invocation| {
            let script = script.clone();
            async move { script.play(&invocation.fixture, &invocation.cancellation).await }
        })
    }

    pub fn into_hook(self) -> HookFn {
        let script = Arc::new(self);
        hook(move |invocation: Invocation| {
            let script = script.clone();
            async move { script.play(&invocation.fixture, &invocation.cancellation).await }
        })
    }
}

/// Fixture of manifest classes; keeps whatever its constructor was given
#[derive(Debug, Default)]
pub struct ScriptFixture {
    context: Option<TestContext>,
    output: Option<OutputWriter>,
}

impl TestFixture for ScriptFixture {}

impl ScriptFixture {
    pub fn attempt(&self) -> u32 {
        self.context.as_ref().map_or(0, TestContext::attempt)
    }

    pub fn writer(&self) -> Option<&OutputWriter> {
        self.output
            .as_ref()
            .or_else(|| self.context.as_ref().map(TestContext::output))
    }

    /// Constructor of the given shape producing a `ScriptFixture`
    pub fn constructor(shape: ConstructorShape) -> Constructor {
        fn wrap(context: Option<TestContext>, output: Option<OutputWriter>) -> TestResult<FixtureRef> {
            Ok(Arc::new(ScriptFixture { context, output }))
        }

        match shape {
            ConstructorShape::ContextAndOutput => {
                Constructor::context_and_output(|context, output| wrap(Some(context), Some(output)))
            }
            ConstructorShape::OutputAndContext => {
                Constructor::output_and_context(|output, context| wrap(Some(context), Some(output)))
            }
            ConstructorShape::Context => Constructor::context(|context| wrap(Some(context), None)),
            ConstructorShape::Output => Constructor::output(|output| wrap(None, Some(output))),
            ConstructorShape::Default => Constructor::default_with(|| wrap(None, None)),
        }
    }
}
