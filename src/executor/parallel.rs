//! Batch execution
//!
//! Serial batches run inline; other batches run as spawned tasks bounded by
//! a semaphore sized to the batch concurrency.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use super::runner::run_test;
use super::{RunError, RunState};
use crate::scheduler::TestBatch;
use crate::sink::Report;

pub(crate) async fn run_batch(state: &Arc<RunState>, batch: &TestBatch) -> Result<(), RunError> {
    if batch.is_skip_batch() {
        for test in batch.tests() {
            let reason = test
                .skip_reason
                .as_deref()
                .unwrap_or(state.config.dependency_skip_reason.as_str());
            state.sink.skipped(test, reason, Report::empty()).await;
        }
        return Ok(());
    }

    if batch.is_serial() || batch.concurrency() <= 1 || batch.len() <= 1 {
        for test in batch.tests() {
            if let Err(e) = run_test(state, test).await {
                state.cancellation.cancel();
                return Err(e);
            }
        }
        return Ok(());
    }

    debug!(
        "Running {} tests with up to {} concurrent",
        batch.len(),
        batch.concurrency()
    );

    let semaphore = Arc::new(Semaphore::new(batch.concurrency()));
    let mut handles = Vec::with_capacity(batch.len());

    for test in batch.tests() {
        let semaphore = semaphore.clone();
        let state = state.clone();
        let test = test.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| RunError::Critical {
                    test: test.id.clone(),
                    message: e.to_string(),
                })?;

            let result = run_test(&state, &test).await;
            if result.is_err() {
                // Stop the rest of the batch promptly
                state.cancellation.cancel();
            }
            result
        });

        handles.push(handle);
    }

    let mut first_error = None;
    for (joined, test) in join_all(handles).await.into_iter().zip(batch.tests()) {
        let result = joined.unwrap_or_else(|e| {
            Err(RunError::Critical {
                test: test.id.clone(),
                message: format!("test task failed: {e}"),
            })
        });
        if let Err(e) = result {
            state.cancellation.cancel();
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}
