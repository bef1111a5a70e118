//! testgraph - dependency-aware parallel test execution
//!
//! Runs a set of test-case descriptors to completion while honoring
//! dependencies between tests, constraint keys, exclusive groups and
//! parallel limits. Every test is reported exactly once through a
//! [`ResultSink`]; setup and teardown hooks run exactly once per test,
//! class and assembly.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use testgraph::{CollectingSink, EngineConfig, ExecutionEngine, SuiteManifest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manifest = SuiteManifest::load("checkout.yaml")?;
//! let sink = Arc::new(CollectingSink::new());
//! let engine = ExecutionEngine::new(EngineConfig::default().with_max_parallelism(4));
//!
//! engine
//!     .run(manifest.to_descriptors(&[]), sink.clone(), CancellationToken::new())
//!     .await?;
//! println!("{}", sink.summary(&manifest.name));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod graph;
pub mod models;
pub mod output;
pub mod results;
pub mod scheduler;
pub mod sink;
pub mod suite;
pub mod utils;

pub use executor::{EngineConfig, ExecutionEngine, RunError, RunReport};
pub use graph::{DependencyGraph, GraphError};
pub use models::{
    RunSummary, TestCaseDescriptor, TestCaseId, TestClass, TestError, TestOutcome, TestRecord,
};
pub use scheduler::{BatchScheduler, TestBatch};
pub use sink::{CollectingSink, Report, ResultSink};
pub use suite::SuiteManifest;
