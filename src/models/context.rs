//! Per-attempt test context
//!
//! Every attempt gets a fresh [`TestContext`] carrying the test identity,
//! its arguments, a captured output buffer and an artifact list.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use super::descriptor::{TestCaseDescriptor, TestCaseId};

/// File produced by a test and attached to its report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            description: None,
            media_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Shared text buffer capturing what a test writes
#[derive(Clone, Debug, Default)]
pub struct OutputWriter {
    buffer: Arc<Mutex<String>>,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text
    pub fn write(&self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    /// Append a line
    pub fn writeln(&self, line: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push_str(line);
        buffer.push('\n');
    }

    /// Snapshot of everything written so far
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Scoped context for one attempt of one test (or for a class/assembly scope)
#[derive(Clone, Debug)]
pub struct TestContext {
    id: TestCaseId,
    display_name: String,
    class_name: String,
    arguments: Arc<[serde_json::Value]>,
    attempt: u32,
    output: OutputWriter,
    artifacts: Arc<Mutex<Vec<Artifact>>>,
}

impl TestContext {
    /// Context for one attempt of a test
    pub fn for_test(descriptor: &TestCaseDescriptor, attempt: u32) -> Self {
        Self {
            id: descriptor.id.clone(),
            display_name: descriptor.display_name.clone(),
            class_name: descriptor.class.name().to_string(),
            arguments: descriptor.arguments.clone().into(),
            attempt,
            output: OutputWriter::new(),
            artifacts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Context for class- or assembly-level fixtures, which belong to no single test
    pub fn for_scope(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        Self {
            id: TestCaseId::new(scope.clone()),
            display_name: scope.clone(),
            class_name: scope,
            arguments: Arc::from(Vec::new()),
            attempt: 0,
            output: OutputWriter::new(),
            artifacts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &TestCaseId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    /// 1-based attempt number (0 for scope contexts)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn output(&self) -> &OutputWriter {
        &self.output
    }

    pub fn attach(&self, artifact: Artifact) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(artifact);
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Captured output, or `None` if nothing was written
    pub fn captured_output(&self) -> Option<String> {
        if self.output.is_empty() {
            None
        } else {
            Some(self.output.contents())
        }
    }
}
