//! Test case descriptors
//!
//! A [`TestCaseDescriptor`] is one fully expanded, concrete unit of work.
//! Descriptors are produced upstream and never mutated during a run.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::TestResult;
use super::fixture::{FixtureRef, TestClass};

/// Unique test identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCaseId(String);

impl TestCaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestCaseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TestCaseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a hook or body receives
#[derive(Clone)]
pub struct Invocation {
    pub fixture: FixtureRef,
    pub cancellation: CancellationToken,
}

/// Callable test body
pub type TestBody = Arc<dyn Fn(Invocation) -> BoxFuture<'static, TestResult> + Send + Sync>;

/// Callable lifecycle hook
pub type HookFn = Arc<dyn Fn(Invocation) -> BoxFuture<'static, TestResult> + Send + Sync>;

/// Wrap an async closure as a test body
pub fn body<F, Fut>(f: F) -> TestBody
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TestResult> + Send + 'static,
{
    Arc::new(move |invocation| f(invocation).boxed())
}

/// Wrap an async closure as a lifecycle hook
pub fn hook<F, Fut>(f: F) -> HookFn
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TestResult> + Send + 'static,
{
    Arc::new(move |invocation| f(invocation).boxed())
}

/// Granularity at which a hook runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookScope {
    Test,
    Class,
    Assembly,
    /// Run once globally by the caller, never by the engine
    Session,
}

/// Before/after hooks of one scope
#[derive(Clone, Default)]
pub struct HookSet {
    pub before: Vec<HookFn>,
    pub after: Vec<HookFn>,
}

impl HookSet {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Hooks of every scope attached to a descriptor
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub test: HookSet,
    pub class: HookSet,
    pub assembly: HookSet,
    pub session: HookSet,
}

impl LifecycleHooks {
    pub fn scope(&self, scope: HookScope) -> &HookSet {
        match scope {
            HookScope::Test => &self.test,
            HookScope::Class => &self.class,
            HookScope::Assembly => &self.assembly,
            HookScope::Session => &self.session,
        }
    }

    fn scope_mut(&mut self, scope: HookScope) -> &mut HookSet {
        match scope {
            HookScope::Test => &mut self.test,
            HookScope::Class => &mut self.class,
            HookScope::Assembly => &mut self.assembly,
            HookScope::Session => &mut self.session,
        }
    }

    pub fn add_before(&mut self, scope: HookScope, hook: HookFn) {
        self.scope_mut(scope).before.push(hook);
    }

    pub fn add_after(&mut self, scope: HookScope, hook: HookFn) {
        self.scope_mut(scope).after.push(hook);
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = |set: &HookSet| (set.before.len(), set.after.len());
        f.debug_struct("LifecycleHooks")
            .field("test", &counts(&self.test))
            .field("class", &counts(&self.class))
            .field("assembly", &counts(&self.assembly))
            .field("session", &counts(&self.session))
            .finish()
    }
}

/// Parallelism constraints of a test case
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Run alone, outside exclusive groups; a group member still runs with its group
    #[serde(default)]
    pub not_in_parallel: bool,
    /// Tests sharing any key never overlap in time
    #[serde(default)]
    pub constraint_keys: Vec<String>,
    /// Members of the same group run together and only together
    #[serde(default)]
    pub exclusive_group: Option<String>,
    /// Cap on concurrently running tests alongside this one
    #[serde(default)]
    pub parallel_limit: Option<usize>,
}

/// One prerequisite of a test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: TestCaseId,
    /// Run the dependent even if this prerequisite did not pass
    #[serde(default)]
    pub proceed_on_failure: bool,
}

impl Dependency {
    pub fn on(id: impl Into<TestCaseId>) -> Self {
        Self {
            id: id.into(),
            proceed_on_failure: false,
        }
    }

    pub fn proceed_on_failure(mut self) -> Self {
        self.proceed_on_failure = true;
        self
    }
}

/// Retry policy: `count` extra attempts after the first
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub count: u32,
    #[serde(default)]
    pub delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(count: u32) -> Self {
        Self { count, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }
}

/// A single concrete test case
#[derive(Clone)]
pub struct TestCaseDescriptor {
    pub id: TestCaseId,
    pub display_name: String,
    pub class: Arc<TestClass>,
    pub body: Option<TestBody>,
    pub hooks: LifecycleHooks,
    pub parallel: ParallelConfig,
    pub dependencies: Vec<Dependency>,
    pub skip_reason: Option<String>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub categories: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
}

impl TestCaseDescriptor {
    pub fn new(id: impl Into<TestCaseId>, class: Arc<TestClass>) -> Self {
        let id = id.into();
        Self {
            display_name: id.to_string(),
            id,
            class,
            body: None,
            hooks: LifecycleHooks::default(),
            parallel: ParallelConfig::default(),
            dependencies: Vec::new(),
            skip_reason: None,
            timeout: None,
            retry: None,
            categories: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_body(mut self, body: TestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn depends_on(mut self, id: impl Into<TestCaseId>) -> Self {
        self.dependencies.push(Dependency::on(id));
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn not_in_parallel(mut self) -> Self {
        self.parallel.not_in_parallel = true;
        self
    }

    pub fn constraint_key(mut self, key: impl Into<String>) -> Self {
        self.parallel.constraint_keys.push(key.into());
        self
    }

    pub fn exclusive_group(mut self, group: impl Into<String>) -> Self {
        self.parallel.exclusive_group = Some(group.into());
        self
    }

    pub fn parallel_limit(mut self, limit: usize) -> Self {
        self.parallel.parallel_limit = Some(limit);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn argument(mut self, value: serde_json::Value) -> Self {
        self.arguments.push(value);
        self
    }

    pub fn before(mut self, scope: HookScope, hook: HookFn) -> Self {
        self.hooks.add_before(scope, hook);
        self
    }

    pub fn after(mut self, scope: HookScope, hook: HookFn) -> Self {
        self.hooks.add_after(scope, hook);
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// Flat list of prerequisite ids
    pub fn dependency_ids(&self) -> Vec<&TestCaseId> {
        self.dependencies.iter().map(|d| &d.id).collect()
    }

    /// Copy of this descriptor carrying a runtime-assigned skip reason
    pub fn with_skip_reason(&self, reason: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.skip_reason = Some(reason.into());
        copy
    }
}

impl fmt::Debug for TestCaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCaseDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("class", &self.class.name())
            .field("has_body", &self.body.is_some())
            .field("hooks", &self.hooks)
            .field("parallel", &self.parallel)
            .field("dependencies", &self.dependencies)
            .field("skip_reason", &self.skip_reason)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl fmt::Display for TestCaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class.name(), self.display_name)
    }
}
