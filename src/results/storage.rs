//! Results storage and retrieval
//!
//! Provides persistent storage for run summaries in JSON format.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::RunSummary;

/// Stored run containing the full summary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Suite name
    pub suite: String,

    /// Timestamp when the run started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the run completed
    pub completed_at: DateTime<Utc>,

    /// Settings the run used
    pub config: RunConfig,

    /// Environment info
    pub environment: EnvironmentInfo,

    /// Per-test results and counts
    pub summary: RunSummary,
}

/// Engine settings recorded with a run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_parallelism: usize,
    pub chunk_factor: usize,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Host name, when known
    pub hostname: Option<String>,

    /// Tool version
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: std::env::var("HOSTNAME").ok(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    pub fn new(summary: RunSummary) -> Self {
        Self {
            id: generate_run_id(),
            suite: summary.suite.clone(),
            started_at: summary.started_at,
            completed_at: summary.completed_at,
            config: RunConfig::default(),
            environment: EnvironmentInfo::default(),
            summary,
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 1_000_000;
    format!("{timestamp}_{random:06}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Storage under the platform data directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("testgraph")
            .join("results");
        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get path for a suite's results
    fn suite_dir(&self, suite: &str) -> PathBuf {
        self.base_dir.join(sanitize(suite))
    }

    fn run_path(&self, suite: &str, run_id: &str) -> PathBuf {
        self.suite_dir(suite).join(format!("{run_id}.json"))
    }

    /// Save a run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        let suite_dir = self.suite_dir(&run.suite);
        fs::create_dir_all(&suite_dir)
            .with_context(|| format!("Failed to create {}", suite_dir.display()))?;

        let path = self.run_path(&run.suite, &run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved run results to {}", path.display());
        Ok(path)
    }

    /// Load a run by suite and id
    pub fn load(&self, suite: &str, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(suite, run_id);
        let run = self.load_from_path(&path)?;
        debug!("Loaded run results from {}", path.display());
        Ok(run)
    }

    /// Load a run by id from any suite
    pub fn find(&self, run_id: &str) -> Result<StoredRun> {
        for suite in self.list_suites()? {
            let path = self.base_dir.join(&suite).join(format!("{run_id}.json"));
            if path.exists() {
                return self.load_from_path(&path);
            }
        }
        anyhow::bail!("No stored run with id '{run_id}' in {}", self.base_dir.display())
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open results file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// Load all runs for a suite, newest first
    pub fn load_suite(&self, suite: &str) -> Result<Vec<StoredRun>> {
        let suite_dir = self.suite_dir(suite);
        if !suite_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&suite_dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// List all suites with results
    pub fn list_suites(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut suites = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    suites.push(name.to_string());
                }
            }
        }

        suites.sort();
        Ok(suites)
    }

    /// Brief info for every stored run, optionally limited to one suite
    pub fn list_runs(&self, suite: Option<&str>) -> Result<Vec<RunInfo>> {
        let suites = match suite {
            Some(suite) => vec![sanitize(suite)],
            None => self.list_suites()?,
        };

        let mut runs = Vec::new();
        for suite in suites {
            runs.extend(self.load_suite(&suite)?.iter().map(RunInfo::from));
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Latest run for a suite
    pub fn latest(&self, suite: &str) -> Result<Option<StoredRun>> {
        Ok(self.load_suite(suite)?.into_iter().next())
    }

    /// Delete a run
    pub fn delete(&self, suite: &str, run_id: &str) -> Result<()> {
        let path = self.run_path(suite, run_id);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Deleted results: {}", path.display());
        }
        Ok(())
    }

    /// Export run to a file
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record([
                    "run_id",
                    "test_id",
                    "class",
                    "name",
                    "outcome",
                    "duration_ms",
                    "error_kind",
                    "message",
                ])?;

                for record in &run.summary.results {
                    writer.write_record([
                        run.id.clone(),
                        record.id.to_string(),
                        record.class_name.clone(),
                        record.display_name.clone(),
                        record.outcome.to_string(),
                        record.duration_ms.to_string(),
                        record.error_kind.clone().unwrap_or_default(),
                        record.message.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Directory-safe suite name
fn sanitize(suite: &str) -> String {
    suite
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub pass_rate: f64,
    pub has_failures: bool,
}

impl From<&StoredRun> for RunInfo {
    fn from(run: &StoredRun) -> Self {
        Self {
            id: run.id.clone(),
            suite: run.suite.clone(),
            started_at: run.started_at,
            total: run.summary.total,
            pass_rate: run.summary.pass_rate(),
            has_failures: run.summary.has_failures(),
        }
    }
}

/// Export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestCaseDescriptor, TestClass, TestRecord};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn run(suite: &str) -> StoredRun {
        let class = Arc::new(TestClass::new("Checkout"));
        let records = vec![
            TestRecord::passed(&TestCaseDescriptor::new("login", class.clone()), 10),
            TestRecord::error(&TestCaseDescriptor::new("pay", class), 5, "connection, reset")
                .with_error_kind("runtime"),
        ];
        StoredRun::new(RunSummary::new(suite, records, Utc::now(), 15))
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert_eq!(id.len(), "20260101_000000_000000".len());
    }

    #[test]
    fn test_save_load_and_find() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let stored = run("Checkout Flow");

        let path = storage.save(&stored).unwrap();
        assert!(path.starts_with(dir.path().join("checkout_flow")));

        let loaded = storage.load("Checkout Flow", &stored.id).unwrap();
        assert_eq!(loaded.summary.total, 2);
        assert_eq!(storage.find(&stored.id).unwrap().suite, "Checkout Flow");
        assert!(storage.find("missing").is_err());
    }

    #[test]
    fn test_list_runs() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        storage.save(&run("alpha")).unwrap();
        storage.save(&run("beta")).unwrap();

        assert_eq!(storage.list_suites().unwrap(), vec!["alpha", "beta"]);
        assert_eq!(storage.list_runs(None).unwrap().len(), 2);

        let alpha = storage.list_runs(Some("alpha")).unwrap();
        assert_eq!(alpha.len(), 1);
        assert!(alpha[0].has_failures);
        assert!(storage.latest("alpha").unwrap().is_some());
    }

    #[test]
    fn test_export_csv() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let stored = run("checkout");
        let path = dir.path().join("export.csv");

        storage.export(&stored, &path, ExportFormat::Csv).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][4], "ERROR");
        assert_eq!(&rows[1][6], "runtime");
        assert_eq!(&rows[1][7], "connection, reset");
    }

    #[test]
    fn test_export_format() {
        assert_eq!(ExportFormat::from_str("JSON"), Some(ExportFormat::Json));
        assert_eq!(
            ExportFormat::from_extension(Path::new("out.csv")),
            Some(ExportFormat::Csv)
        );
        assert!(ExportFormat::from_str("xml").is_none());
    }

    #[test]
    fn test_environment_info() {
        let env = EnvironmentInfo::default();
        assert!(!env.os.is_empty());
        assert_eq!(env.tool_version, env!("CARGO_PKG_VERSION"));
    }
}
