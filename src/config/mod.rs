//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod file;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};
pub use file::ConfigFile;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::executor::EngineConfig;
use crate::scheduler::{SchedulerConfig, DEPENDENCY_SKIP_PREFIX};

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Concurrency cap for tests without an explicit parallel limit
    pub max_parallelism: usize,

    /// Parallel batches hold up to `cap * chunk_factor` tests
    pub chunk_factor: usize,

    /// Timeout for tests that do not declare one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Log level
    pub log_level: String,

    /// Directory for stored runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<String>,

    /// Prefix of cascade-skip reasons
    pub dependency_skip_reason: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            max_parallelism: scheduler.default_parallelism,
            chunk_factor: scheduler.chunk_factor,
            timeout_ms: None,
            format: "table".to_string(),
            log_level: "info".to_string(),
            results_dir: None,
            dependency_skip_reason: DEPENDENCY_SKIP_PREFIX.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Self = if file::is_yaml_file(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if file::is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallelism == 0 {
            anyhow::bail!("max_parallelism must be at least 1");
        }
        if self.chunk_factor == 0 {
            anyhow::bail!("chunk_factor must be at least 1");
        }
        if self.timeout_ms == Some(0) {
            anyhow::bail!("timeout_ms must be positive when set");
        }
        Ok(())
    }

    /// Apply environment overrides on top of this config
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(max_parallel) = env.max_parallel {
            self.max_parallelism = max_parallel;
        }
        if let Some(timeout_ms) = env.timeout_ms {
            self.timeout_ms = Some(timeout_ms);
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(level) = &env.log_level {
            self.log_level = level.clone();
        }
        if let Some(dir) = &env.results_dir {
            self.results_dir = Some(dir.clone());
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_parallelism(self.max_parallelism)
            .with_chunk_factor(self.chunk_factor)
            .with_default_timeout(self.default_timeout())
            .with_dependency_skip_reason(self.dependency_skip_reason.clone())
    }
}
