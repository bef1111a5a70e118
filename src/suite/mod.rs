//! Suite manifests
//!
//! A manifest declares classes and tests in YAML or JSON, each test carrying
//! a scripted behavior. It is the binary's way of producing descriptors
//! without any discovery step.

mod script;

pub use script::{Script, ScriptFixture, ScriptResult};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{
    ConstructorShape, Dependency, HookScope, ParallelConfig, RetryPolicy, TestCaseDescriptor,
    TestClass,
};

const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1"];

/// Problems found while parsing or validating a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse YAML manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    #[error("test #{0} has an empty id")]
    EmptyId(usize),

    #[error("duplicate test id '{0}'")]
    DuplicateId(String),

    #[error("duplicate class '{0}'")]
    DuplicateClass(String),

    #[error("test '{test}' uses undeclared class '{class}'")]
    UnknownClass { test: String, class: String },

    #[error("class '{class}' has unknown constructor shape '{shape}'")]
    UnknownConstructor { class: String, shape: String },

    #[error("test '{0}' has a parallel limit of zero")]
    ZeroParallelLimit(String),
}

/// Setup/teardown scripts of a scope
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeScripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Script>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Script>,
}

/// Declared test class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    /// Constructor shape, e.g. `context_and_output` (the default) or `default`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
    #[serde(flatten)]
    pub hooks: ScopeScripts,
}

/// Dependency written as a bare id or with options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Id(String),
    Detailed {
        id: String,
        #[serde(default)]
        proceed_on_failure: bool,
    },
}

impl DependencySpec {
    fn to_dependency(&self) -> Dependency {
        match self {
            DependencySpec::Id(id) => Dependency::on(id.as_str()),
            DependencySpec::Detailed {
                id,
                proceed_on_failure,
            } => Dependency {
                id: id.as_str().into(),
                proceed_on_failure: *proceed_on_failure,
            },
        }
    }

    fn id(&self) -> &str {
        match self {
            DependencySpec::Id(id) | DependencySpec::Detailed { id, .. } => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrySpec {
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Declared test case
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencySpec>,
    #[serde(flatten)]
    pub parallel: ParallelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<serde_json::Value>,
    /// Scripted body; omit to leave the test without a body
    #[serde(default = "default_behavior", skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Script>,
}

fn default_behavior() -> Option<Script> {
    Some(Script::passing())
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_suite_name() -> String {
    "suite".to_string()
}

/// Whole manifest file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuiteManifest {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_suite_name")]
    pub name: String,
    #[serde(default)]
    pub assembly: ScopeScripts,
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

impl SuiteManifest {
    /// Load a manifest; `.yaml`/`.yml` parse as YAML, everything else as JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite manifest: {}", path.display()))?;

        let manifest = if is_yaml_file(path) {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .with_context(|| format!("Invalid suite manifest: {}", path.display()))?;

        debug!(
            "Loaded suite '{}' with {} test(s) from {}",
            manifest.name,
            manifest.tests.len(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural checks; dependency resolution is left to the graph
    pub fn validate(&self) -> Result<(), ManifestError> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(ManifestError::UnsupportedVersion(self.version.clone()));
        }

        let mut classes = HashSet::new();
        for class in &self.classes {
            if !classes.insert(class.name.as_str()) {
                return Err(ManifestError::DuplicateClass(class.name.clone()));
            }
            if let Some(shape) = &class.constructor {
                if ConstructorShape::from_str(shape).is_none() {
                    return Err(ManifestError::UnknownConstructor {
                        class: class.name.clone(),
                        shape: shape.clone(),
                    });
                }
            }
        }

        let mut ids = HashSet::new();
        for (position, test) in self.tests.iter().enumerate() {
            if test.id.trim().is_empty() {
                return Err(ManifestError::EmptyId(position + 1));
            }
            if !ids.insert(test.id.as_str()) {
                return Err(ManifestError::DuplicateId(test.id.clone()));
            }
            if let Some(class) = &test.class {
                if !classes.contains(class.as_str()) {
                    return Err(ManifestError::UnknownClass {
                        test: test.id.clone(),
                        class: class.clone(),
                    });
                }
            }
            if test.parallel.parallel_limit == Some(0) {
                return Err(ManifestError::ZeroParallelLimit(test.id.clone()));
            }
        }

        Ok(())
    }

    /// Ids of tests matching any of `categories`, plus everything they depend on.
    /// An empty filter selects every test.
    pub fn select(&self, categories: &[String]) -> HashSet<String> {
        if categories.is_empty() {
            return self.tests.iter().map(|t| t.id.clone()).collect();
        }

        let by_id: HashMap<&str, &TestSpec> =
            self.tests.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut selected = HashSet::new();
        let mut stack: Vec<&str> = self
            .tests
            .iter()
            .filter(|t| t.categories.iter().any(|c| categories.contains(c)))
            .map(|t| t.id.as_str())
            .collect();

        while let Some(id) = stack.pop() {
            if !selected.insert(id.to_string()) {
                continue;
            }
            if let Some(test) = by_id.get(id) {
                stack.extend(test.depends_on.iter().map(DependencySpec::id));
            }
        }

        selected
    }

    /// Build descriptors for the selected tests, in manifest order
    pub fn to_descriptors(&self, categories: &[String]) -> Vec<TestCaseDescriptor> {
        let classes = self.build_classes();
        let selected = self.select(categories);

        self.tests
            .iter()
            .filter(|t| selected.contains(&t.id))
            .map(|t| self.build_descriptor(t, &classes))
            .collect()
    }

    fn build_classes(&self) -> HashMap<String, Arc<TestClass>> {
        let mut classes: HashMap<String, Arc<TestClass>> = self
            .classes
            .iter()
            .map(|spec| {
                let shape = spec
                    .constructor
                    .as_deref()
                    .and_then(ConstructorShape::from_str)
                    .unwrap_or(ConstructorShape::ContextAndOutput);
                let class = TestClass::new(spec.name.as_str())
                    .with_constructor(ScriptFixture::constructor(shape));
                (spec.name.clone(), Arc::new(class))
            })
            .collect();

        // Tests without a class share one named after the suite
        classes.entry(self.name.clone()).or_insert_with(|| {
            Arc::new(
                TestClass::new(self.name.as_str())
                    .with_constructor(ScriptFixture::constructor(ConstructorShape::ContextAndOutput)),
            )
        });

        classes
    }

    fn build_descriptor(
        &self,
        spec: &TestSpec,
        classes: &HashMap<String, Arc<TestClass>>,
    ) -> TestCaseDescriptor {
        let class_name = spec.class.as_deref().unwrap_or(self.name.as_str());
        let class = classes
            .get(class_name)
            .cloned()
            .unwrap_or_else(|| Arc::new(TestClass::new(class_name)));

        let mut descriptor = TestCaseDescriptor::new(spec.id.as_str(), class);
        if let Some(name) = &spec.name {
            descriptor = descriptor.with_display_name(name.as_str());
        }

        descriptor.dependencies = spec.depends_on.iter().map(DependencySpec::to_dependency).collect();
        descriptor.parallel = spec.parallel.clone();
        descriptor.skip_reason = spec.skip.clone();
        descriptor.timeout = spec.timeout_ms.map(Duration::from_millis);
        descriptor.retry = spec.retry.as_ref().map(|r| RetryPolicy {
            count: r.count,
            delay: r.delay_ms.map(Duration::from_millis),
        });
        descriptor.categories = spec.categories.clone();
        descriptor.arguments = spec.arguments.clone();
        descriptor.body = spec.behavior.clone().map(Script::into_body);

        if let Some(setup) = &self.assembly.setup {
            descriptor = descriptor.before(HookScope::Assembly, setup.clone().into_hook());
        }
        if let Some(teardown) = &self.assembly.teardown {
            descriptor = descriptor.after(HookScope::Assembly, teardown.clone().into_hook());
        }

        if let Some(class_spec) = self.classes.iter().find(|c| c.name == class_name) {
            if let Some(setup) = &class_spec.hooks.setup {
                descriptor = descriptor.before(HookScope::Class, setup.clone().into_hook());
            }
            if let Some(teardown) = &class_spec.hooks.teardown {
                descriptor = descriptor.after(HookScope::Class, teardown.clone().into_hook());
            }
        }

        descriptor
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
