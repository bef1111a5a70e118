//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dependency-aware parallel test runner
#[derive(Parser, Debug)]
#[command(name = "testgraph")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Run test suites with dependencies, batching, retries and lifecycle hooks")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file
    #[arg(long = "config", global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a suite manifest
    Run(RunArgs),

    /// Show the batch plan of a suite without running it
    List(ListArgs),

    /// View and export stored runs
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite manifest (YAML or JSON)
    #[arg(short, long)]
    pub suite: PathBuf,

    /// Concurrency cap for tests without an explicit parallel limit
    #[arg(short = 'j', long)]
    pub max_parallel: Option<usize>,

    /// Timeout for tests that declare none, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Write the formatted summary to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Store the run in the results directory
    #[arg(long)]
    pub save: bool,

    /// Only run tests in these categories (and what they depend on)
    #[arg(short, long = "category")]
    pub categories: Vec<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Suite manifest (YAML or JSON)
    #[arg(short, long)]
    pub suite: PathBuf,

    /// Concurrency cap used for planning
    #[arg(short = 'j', long)]
    pub max_parallel: Option<usize>,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Only plan tests in these categories (and what they depend on)
    #[arg(short, long = "category")]
    pub categories: Vec<String>,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,

    /// Results directory
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List stored runs
    List {
        /// Filter by suite
        #[arg(short, long)]
        suite: Option<String>,
    },

    /// Show a stored run (latest when no id is given)
    Show {
        /// Run ID
        id: Option<String>,

        /// Suite to take the latest run from
        #[arg(short, long)]
        suite: Option<String>,

        /// Output format (table, json, json-pretty, csv, summary)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Export a stored run to JSON or CSV
    Export {
        /// Run ID
        id: String,

        /// Destination file; format follows the extension
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, csv); overrides the extension
        #[arg(short, long)]
        format: Option<String>,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./testgraph.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Show environment overrides only
        #[arg(long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Describe supported environment variables
    Env,
}
