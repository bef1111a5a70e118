//! Test execution engine
//!
//! Runs a set of descriptors to completion: builds the dependency graph,
//! consumes scheduler batches one at a time, and reports every test exactly
//! once through the caller's sink. Class and assembly teardown always run.

mod constructor;
mod lifecycle;
mod parallel;
mod runner;

#[cfg(test)]
mod scenarios;

pub use constructor::ConstructorCache;
pub use lifecycle::{catch_panic, run_hooks, AssemblyScope, ClassContext, ClassRegistry, ScopeGate};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::graph::{DependencyGraph, GraphError};
use crate::models::{TestCaseDescriptor, TestCaseId};
use crate::scheduler::{BatchScheduler, OutcomeTable, SchedulerConfig, DEPENDENCY_SKIP_PREFIX};
use crate::sink::{OutcomeRecordingSink, Report, ResultSink};
use crate::utils::Timer;

/// Skip reason for tests left over when a run is cancelled
pub const RUN_CANCELLED: &str = "Run cancelled";

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("critical fault in test '{test}': {message}")]
    Critical { test: TestCaseId, message: String },
}

/// Engine configuration
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Concurrency cap for tests without an explicit parallel limit
    pub max_parallelism: usize,
    pub chunk_factor: usize,
    /// Timeout for tests that do not declare one
    pub default_timeout: Option<Duration>,
    pub dependency_skip_reason: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            max_parallelism: scheduler.default_parallelism,
            chunk_factor: scheduler.chunk_factor,
            default_timeout: None,
            dependency_skip_reason: DEPENDENCY_SKIP_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_chunk_factor(mut self, chunk_factor: usize) -> Self {
        self.chunk_factor = chunk_factor.max(1);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_dependency_skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.dependency_skip_reason = reason.into();
        self
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            default_parallelism: self.max_parallelism,
            chunk_factor: self.chunk_factor,
            skip_reason_prefix: self.dependency_skip_reason.clone(),
        }
    }
}

/// What a finished run looked like
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub total: usize,
    pub batches: usize,
    pub rounds: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

/// State owned by one `run` invocation and shared with its tasks
pub(crate) struct RunState {
    pub config: EngineConfig,
    pub sink: OutcomeRecordingSink,
    pub assembly: AssemblyScope,
    pub classes: ClassRegistry,
    pub constructors: ConstructorCache,
    pub cancellation: CancellationToken,
}

/// Dependency-aware parallel test engine
#[derive(Clone, Debug, Default)]
pub struct ExecutionEngine {
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `descriptors` and report each exactly once to `sink`.
    ///
    /// Cancelling `cancellation` stops scheduling; tests that never got an
    /// outcome are then reported Skipped.
    pub async fn run(
        &self,
        descriptors: Vec<TestCaseDescriptor>,
        sink: Arc<dyn ResultSink>,
        cancellation: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let timer = Timer::start("run");
        let graph = DependencyGraph::build(descriptors)?;
        let total = graph.len();

        if graph.is_empty() {
            info!("Nothing to run");
            return Ok(RunReport::default());
        }

        let first = graph.node(0).descriptor().clone();
        let outcomes = Arc::new(OutcomeTable::new());
        let mut scheduler =
            BatchScheduler::new(graph, outcomes.clone(), self.config.scheduler_config());

        let state = Arc::new(RunState {
            config: self.config.clone(),
            sink: OutcomeRecordingSink::new(sink, outcomes),
            assembly: AssemblyScope::new(),
            classes: ClassRegistry::new(),
            constructors: ConstructorCache::new(),
            cancellation: cancellation.child_token(),
        });

        info!(
            "Starting run: {} test(s), max parallelism {}",
            total, self.config.max_parallelism
        );

        let result = drive(&state, &mut scheduler, &first).await;

        if result.is_ok() && state.cancellation.is_cancelled() {
            let leftover = scheduler.unreported();
            info!("Run cancelled, skipping {} remaining test(s)", leftover.len());
            for test in leftover {
                state.sink.skipped(&test, RUN_CANCELLED, Report::empty()).await;
            }
        }

        cleanup(&state).await;

        if let Err(e) = &result {
            error!("Run aborted: {}", e);
        }
        result?;

        let report = RunReport {
            total,
            batches: scheduler.batches_yielded(),
            rounds: scheduler.current_round(),
            cancelled: state.cancellation.is_cancelled(),
            duration: timer.stop(),
        };

        info!(
            "Run completed in {}ms: {} test(s), {} batch(es) over {} round(s)",
            report.duration.as_millis(),
            report.total,
            report.batches,
            report.rounds
        );

        Ok(report)
    }
}

async fn drive(
    state: &Arc<RunState>,
    scheduler: &mut BatchScheduler,
    first: &Arc<TestCaseDescriptor>,
) -> Result<(), RunError> {
    state
        .assembly
        .ensure_setup(first, &state.constructors, &state.cancellation)
        .await?;

    let mut round = 0;
    while let Some(batch) = scheduler.next_batch(&state.cancellation) {
        if scheduler.current_round() != round {
            round = scheduler.current_round();
            info!("Round {}", round);
        }
        parallel::run_batch(state, &batch).await?;
    }

    Ok(())
}

/// Class teardown for every class seen, then assembly teardown
async fn cleanup(state: &RunState) {
    for class in state.classes.drain() {
        class.teardown().await;
    }
    state.assembly.teardown(&state.constructors).await;
}
