//! Lifecycle scopes
//!
//! Assembly and class setup run exactly once per run, lazily, under their
//! own async lock. The result of a setup is remembered as a [`ScopeGate`]
//! that every later test of the scope consults before running.

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::constructor::ConstructorCache;
use super::RunError;
use crate::models::{
    FixtureRef, HookFn, Invocation, TestCaseDescriptor, TestClass, TestContext, TestError,
    TestResult,
};

/// Outcome of a scope's setup as seen by the tests inside it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ScopeGate {
    #[default]
    Open,
    /// Setup asked to skip; every test in scope is Skipped
    Skipped(String),
    /// Setup failed; every test in scope is reported Error
    Failed(String),
}

impl ScopeGate {
    fn from_result(
        scope: &str,
        trigger: &TestCaseDescriptor,
        result: TestResult,
    ) -> Result<Self, RunError> {
        match result {
            Ok(()) => Ok(ScopeGate::Open),
            Err(TestError::Skip(reason)) => Ok(ScopeGate::Skipped(reason)),
            Err(TestError::Critical(message)) => Err(RunError::Critical {
                test: trigger.id.clone(),
                message,
            }),
            Err(e) => Ok(ScopeGate::Failed(format!("{scope} setup failed: {e:#}"))),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Await `future`, turning a panic into an assertion failure
pub async fn catch_panic<F>(future: F) -> TestResult
where
    F: Future<Output = TestResult>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TestError::assertion(panic_message(payload.as_ref()))),
    }
}

/// Run hooks in order; the first error stops the rest
pub async fn run_hooks(
    hooks: &[HookFn],
    fixture: &FixtureRef,
    cancellation: &CancellationToken,
) -> TestResult {
    for hook in hooks {
        let invocation = Invocation {
            fixture: fixture.clone(),
            cancellation: cancellation.clone(),
        };
        let hook = hook.clone();
        catch_panic(async move { hook(invocation).await }).await?;
    }
    Ok(())
}

/// Run hooks against a fixture built just for them, then dispose it
async fn with_scope_fixture(
    scope: &str,
    class: &TestClass,
    hooks: &[HookFn],
    constructors: &ConstructorCache,
    cancellation: &CancellationToken,
) -> TestResult {
    let context = TestContext::for_scope(scope);
    let fixture = constructors.instantiate(class, &context)?;
    let result = run_hooks(hooks, &fixture, cancellation).await;

    if let Err(e) = catch_panic(fixture.dispose()).await {
        warn!("Disposing {} fixture failed: {:#}", scope, e);
    }
    result
}

#[derive(Default)]
struct AssemblyState {
    initialized: bool,
    gate: ScopeGate,
    owner: Option<Arc<TestCaseDescriptor>>,
}

/// Run-wide setup and teardown
#[derive(Default)]
pub struct AssemblyScope {
    state: tokio::sync::Mutex<AssemblyState>,
}

impl AssemblyScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run assembly before-hooks once; later callers get the remembered gate
    pub async fn ensure_setup(
        &self,
        trigger: &Arc<TestCaseDescriptor>,
        constructors: &ConstructorCache,
        cancellation: &CancellationToken,
    ) -> Result<ScopeGate, RunError> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(state.gate.clone());
        }
        state.initialized = true;
        state.owner = Some(trigger.clone());

        let hooks = &trigger.hooks.assembly.before;
        if !hooks.is_empty() {
            debug!("Running {} assembly setup hook(s)", hooks.len());
            let result =
                with_scope_fixture("assembly", &trigger.class, hooks, constructors, cancellation)
                    .await;
            state.gate = ScopeGate::from_result("assembly", trigger, result)?;
        }

        Ok(state.gate.clone())
    }

    /// Run assembly after-hooks. Errors are logged.
    pub async fn teardown(&self, constructors: &ConstructorCache) {
        let state = self.state.lock().await;
        let Some(owner) = state.owner.as_ref().filter(|_| state.initialized) else {
            return;
        };

        let hooks = &owner.hooks.assembly.after;
        if hooks.is_empty() {
            return;
        }

        // Teardown must run even after the run token was cancelled
        let token = CancellationToken::new();
        if let Err(e) = with_scope_fixture("assembly", &owner.class, hooks, constructors, &token).await {
            warn!("Assembly teardown failed: {:#}", e);
        }
    }
}

#[derive(Default)]
struct ClassState {
    initialized: bool,
    gate: ScopeGate,
    fixture: Option<FixtureRef>,
    owner: Option<Arc<TestCaseDescriptor>>,
}

/// Setup state of one test class
pub struct ClassContext {
    name: String,
    state: tokio::sync::Mutex<ClassState>,
}

impl ClassContext {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: tokio::sync::Mutex::new(ClassState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build the shared fixture and run class before-hooks once
    pub async fn ensure_setup(
        &self,
        trigger: &Arc<TestCaseDescriptor>,
        constructors: &ConstructorCache,
        cancellation: &CancellationToken,
    ) -> Result<ScopeGate, RunError> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(state.gate.clone());
        }
        state.initialized = true;
        state.owner = Some(trigger.clone());

        let hooks = &trigger.hooks.class;
        if hooks.is_empty() {
            return Ok(ScopeGate::Open);
        }

        debug!("Running class setup for {}", self.name);
        let context = TestContext::for_scope(self.name.as_str());
        let result = match constructors.instantiate(&trigger.class, &context) {
            Ok(fixture) => {
                let result = run_hooks(&hooks.before, &fixture, cancellation).await;
                state.fixture = Some(fixture);
                result
            }
            Err(e) => Err(e),
        };
        let scope = format!("class {}", self.name);
        state.gate = ScopeGate::from_result(&scope, trigger, result)?;

        Ok(state.gate.clone())
    }

    /// Run class after-hooks and dispose the shared fixture. Errors are logged.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        let Some(fixture) = state.fixture.take() else {
            return;
        };

        let token = CancellationToken::new();
        if let Some(owner) = state.owner.as_ref() {
            if let Err(e) = run_hooks(&owner.hooks.class.after, &fixture, &token).await {
                warn!("Class teardown for {} failed: {:#}", self.name, e);
            }
        }
        if let Err(e) = catch_panic(fixture.dispose()).await {
            warn!("Disposing class fixture for {} failed: {:#}", self.name, e);
        }
    }
}

#[derive(Default)]
struct ClassMap {
    by_name: HashMap<String, Arc<ClassContext>>,
    order: Vec<Arc<ClassContext>>,
}

/// Concurrent map of class contexts with atomic get-or-create
#[derive(Default)]
pub struct ClassRegistry {
    inner: Mutex<ClassMap>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, class: &TestClass) -> Arc<ClassContext> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(context) = map.by_name.get(class.name()) {
            return context.clone();
        }
        let context = Arc::new(ClassContext::new(class.name()));
        map.by_name.insert(class.name().to_string(), context.clone());
        map.order.push(context.clone());
        context
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Remove every context, in creation order
    pub fn drain(&self) -> Vec<Arc<ClassContext>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.by_name.clear();
        std::mem::take(&mut map.order)
    }
}
