//! Results storage module
//!
//! Provides persistent storage and export of run summaries.

mod storage;

pub use storage::{EnvironmentInfo, ExportFormat, ResultsStorage, RunConfig, RunInfo, StoredRun};
