//! Single test execution
//!
//! Applies the skip/setup precedence for one test and drives its attempts
//! through the retry and timeout rules.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::lifecycle::{catch_panic, run_hooks, ScopeGate};
use super::{RunError, RunState, RUN_CANCELLED};
use crate::models::{
    FixtureRef, Invocation, RetryPolicy, TestBody, TestCaseDescriptor, TestContext, TestError,
    TestResult,
};
use crate::sink::Report;
use crate::utils::Timer;

/// Run one test to a single reported outcome
pub(crate) async fn run_test(
    state: &RunState,
    test: &Arc<TestCaseDescriptor>,
) -> Result<(), RunError> {
    if let Some(reason) = &test.skip_reason {
        state.sink.skipped(test, reason, Report::empty()).await;
        return Ok(());
    }

    if state.cancellation.is_cancelled() {
        state.sink.skipped(test, RUN_CANCELLED, Report::empty()).await;
        return Ok(());
    }

    let gate = state
        .assembly
        .ensure_setup(test, &state.constructors, &state.cancellation)
        .await?;
    if !pass_gate(state, test, gate).await {
        return Ok(());
    }

    let class = state.classes.get_or_create(&test.class);
    let gate = class
        .ensure_setup(test, &state.constructors, &state.cancellation)
        .await?;
    if !pass_gate(state, test, gate).await {
        return Ok(());
    }

    let Some(body) = test.body.clone() else {
        let err = TestError::runtime("test has no body");
        state.sink.error(test, &err, Report::empty()).await;
        return Ok(());
    };

    run_attempts(state, test, body).await
}

/// Report the test if its scope is closed. Returns whether it may run.
async fn pass_gate(state: &RunState, test: &TestCaseDescriptor, gate: ScopeGate) -> bool {
    match gate {
        ScopeGate::Open => true,
        ScopeGate::Skipped(reason) => {
            state.sink.skipped(test, &reason, Report::empty()).await;
            false
        }
        ScopeGate::Failed(message) => {
            let err = TestError::runtime(message);
            state.sink.error(test, &err, Report::empty()).await;
            false
        }
    }
}

async fn run_attempts(
    state: &RunState,
    test: &Arc<TestCaseDescriptor>,
    body: TestBody,
) -> Result<(), RunError> {
    let max_attempts = test.retry.as_ref().map_or(1, RetryPolicy::max_attempts);
    let delay = test.retry.as_ref().and_then(|r| r.delay);
    let timeout = test.timeout.or(state.config.default_timeout);
    let mut attempt = 1;

    loop {
        let context = TestContext::for_test(test, attempt);
        let timer = Timer::start(format!("{} attempt {}", test.id, attempt));
        let result = execute_attempt(state, test, &body, &context, timeout).await;
        let report = Report::from_context(&context, timer.stop());

        let err = match result {
            Ok(()) => {
                state.sink.passed(test, report).await;
                return Ok(());
            }
            Err(err) => err,
        };

        match err {
            TestError::Skip(reason) => {
                state.sink.skipped(test, &reason, report).await;
                return Ok(());
            }
            TestError::Critical(message) => {
                error!("Critical fault in {}: {}", test.id, message);
                let err = TestError::Critical(message.clone());
                state.sink.error(test, &err, report).await;
                return Err(RunError::Critical {
                    test: test.id.clone(),
                    message,
                });
            }
            err @ TestError::Timeout(_) => {
                state.sink.error(test, &err, report).await;
                return Ok(());
            }
            err if state.cancellation.is_cancelled() => {
                state.sink.error(test, &err, report).await;
                return Ok(());
            }
            err if attempt < max_attempts => {
                debug!(
                    "{} attempt {}/{} failed: {:#}",
                    test.id, attempt, max_attempts, err
                );
                if let Some(delay) = delay {
                    if !retry_delay(&state.cancellation, delay).await {
                        state.sink.error(test, &TestError::Cancelled, report).await;
                        return Ok(());
                    }
                }
                attempt += 1;
            }
            err if err.is_assertion() => {
                state.sink.failed(test, &err, report).await;
                return Ok(());
            }
            err => {
                state.sink.error(test, &err, report).await;
                return Ok(());
            }
        }
    }
}

/// Sleep before a retry. Returns `false` if the run was cancelled meanwhile.
async fn retry_delay(cancellation: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// One attempt: fresh fixture, hooks and body under the attempt's token, then disposal
async fn execute_attempt(
    state: &RunState,
    test: &TestCaseDescriptor,
    body: &TestBody,
    context: &TestContext,
    timeout: Option<Duration>,
) -> TestResult {
    let fixture = state.constructors.instantiate(&test.class, context)?;
    let token = state.cancellation.child_token();
    let work = attempt_body(test, body, &fixture, &token);

    let result = match timeout {
        Some(limit) => tokio::select! {
            biased;
            _ = state.cancellation.cancelled() => Err(TestError::Cancelled),
            result = work => result,
            _ = tokio::time::sleep(limit) => {
                token.cancel();
                Err(TestError::Timeout(limit))
            }
        },
        None => tokio::select! {
            biased;
            _ = state.cancellation.cancelled() => Err(TestError::Cancelled),
            result = work => result,
        },
    };

    match (result, catch_panic(fixture.dispose()).await) {
        (Ok(()), Err(e)) => Err(e),
        (result, Err(e)) => {
            warn!("Disposing fixture of {} failed: {:#}", test.id, e);
            result
        }
        (result, Ok(())) => result,
    }
}

async fn attempt_body(
    test: &TestCaseDescriptor,
    body: &TestBody,
    fixture: &FixtureRef,
    token: &CancellationToken,
) -> TestResult {
    run_hooks(&test.hooks.test.before, fixture, token).await?;

    let invocation = Invocation {
        fixture: fixture.clone(),
        cancellation: token.clone(),
    };
    let body = body.clone();
    catch_panic(async move { body(invocation).await }).await?;

    run_hooks(&test.hooks.test.after, fixture, token).await
}
