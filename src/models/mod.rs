//! Data models for test execution
//!
//! This module contains the descriptor, fixture, context and outcome types
//! shared by the graph, scheduler and executor.

mod context;
mod descriptor;
mod error;
mod fixture;
mod outcome;

pub use context::{Artifact, OutputWriter, TestContext};
pub use descriptor::{
    body, hook, Dependency, HookFn, HookScope, HookSet, Invocation, LifecycleHooks,
    ParallelConfig, RetryPolicy, TestBody, TestCaseDescriptor, TestCaseId,
};
pub use error::{ensure, TestError, TestResult};
pub use fixture::{
    AsAny, Constructor, ConstructorShape, EmptyFixture, FixtureRef, TestClass, TestFixture,
};
pub use outcome::{RunSummary, TestOutcome, TestRecord};
