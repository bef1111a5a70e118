//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "TESTGRAPH";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Concurrency cap from TESTGRAPH_MAX_PARALLEL
    pub max_parallel: Option<usize>,
    /// Default test timeout from TESTGRAPH_TIMEOUT_MS
    pub timeout_ms: Option<u64>,
    /// Output format from TESTGRAPH_FORMAT
    pub format: Option<String>,
    /// Log level from TESTGRAPH_LOG
    pub log_level: Option<String>,
    /// Config file from TESTGRAPH_CONFIG
    pub config_file: Option<String>,
    /// Results directory from TESTGRAPH_RESULTS_DIR
    pub results_dir: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            max_parallel: get_env_parse("MAX_PARALLEL"),
            timeout_ms: get_env_parse("TIMEOUT_MS"),
            format: get_env("FORMAT"),
            log_level: get_env("LOG"),
            config_file: get_env("CONFIG"),
            results_dir: get_env("RESULTS_DIR"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.max_parallel.is_some()
            || self.timeout_ms.is_some()
            || self.format.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
            || self.results_dir.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_MAX_PARALLEL: {:?}", ENV_PREFIX, self.max_parallel);
        println!("  {}_TIMEOUT_MS:   {:?}", ENV_PREFIX, self.timeout_ms);
        println!("  {}_FORMAT:       {:?}", ENV_PREFIX, self.format);
        println!("  {}_LOG:          {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_RESULTS_DIR:  {:?}", ENV_PREFIX, self.results_dir);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_MAX_PARALLEL"), max_parallel.to_string()));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_TIMEOUT_MS"), timeout_ms.to_string()));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_FORMAT"), format.into()));
        self
    }

    pub fn results_dir(mut self, dir: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_RESULTS_DIR"), dir.into()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all TESTGRAPH environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_MAX_PARALLEL   Concurrency cap for unconstrained tests");
    println!("  {ENV_PREFIX}_TIMEOUT_MS     Timeout for tests that declare none");
    println!("  {ENV_PREFIX}_FORMAT         Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_LOG            Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_CONFIG         Path to configuration file");
    println!("  {ENV_PREFIX}_RESULTS_DIR    Directory for stored runs");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_MAX_PARALLEL=8");
    println!("  testgraph run --suite suite.yaml");
}
