//! testgraph - dependency-aware parallel test runner
//!
//! Runs declarative suite manifests through the execution engine.
//!
//! ## Features
//!
//! - Dependencies between tests with cascade-skip or proceed-on-failure
//! - Constraint keys, exclusive groups and per-test parallel limits
//! - Retries, timeouts and assembly/class/test lifecycle hooks
//! - Multiple output formats (Table, JSON, CSV) and stored runs
//!
//! ## Usage
//!
//! ```bash
//! # Run a suite
//! testgraph run --suite checkout.yaml --max-parallel 8
//!
//! # Only the smoke tests and what they depend on
//! testgraph run --suite checkout.yaml --category smoke --save
//!
//! # Show the batch plan without running anything
//! testgraph list --suite checkout.yaml
//!
//! # Inspect stored runs
//! testgraph results list
//! testgraph results export <run-id> --output run.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod cli;

use cli::Args;
use testgraph::config::{print_env_help, AppConfig, ConfigFile, EnvConfig};
use testgraph::graph::DependencyGraph;
use testgraph::output::{write_results_to_file, OutputFormat, ResultFormatter};
use testgraph::results::{ExportFormat, ResultsStorage, RunConfig, StoredRun};
use testgraph::scheduler::{BatchScheduler, OutcomeTable};
use testgraph::sink::CollectingSink;
use testgraph::suite::SuiteManifest;
use testgraph::utils::{init_logger, LogLevel};
use testgraph::ExecutionEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env = EnvConfig::load();
    let resolved = ConfigFile::resolve(args.config_file.as_deref(), &env);

    let level = LogLevel::resolve(
        args.verbose,
        [
            args.log.as_deref(),
            env.log_level.as_deref(),
            resolved.as_ref().ok().map(|c| c.log_level.as_str()),
        ],
    );
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let has_failures = run_suite(resolved?, run_args).await?;
            if has_failures {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_plan(resolved?, list_args)?;
        }
        cli::Command::Results(results_args) => {
            show_results(resolved?, results_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, resolved)?;
        }
    }

    Ok(())
}

/// Parse the configured output format
fn output_format(name: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown output format: {name}"))
}

fn results_storage(app: &AppConfig, dir: Option<&Path>) -> ResultsStorage {
    match dir
        .map(Path::to_path_buf)
        .or_else(|| app.results_dir.as_ref().map(PathBuf::from))
    {
        Some(dir) => ResultsStorage::new(dir),
        None => ResultsStorage::default_dir(),
    }
}

/// Returns whether any test Failed or Errored
async fn run_suite(mut app: AppConfig, args: cli::RunArgs) -> Result<bool> {
    if let Some(max_parallel) = args.max_parallel {
        app.max_parallelism = max_parallel;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        app.timeout_ms = Some(timeout_ms);
    }
    if let Some(format) = &args.format {
        app.format = format.clone();
    }
    app.validate()?;

    let format = output_format(&app.format)?;
    let manifest = SuiteManifest::load(&args.suite)?;
    let descriptors = manifest.to_descriptors(&args.categories);

    info!(
        "Running suite '{}' ({} of {} test(s) selected)",
        manifest.name,
        descriptors.len(),
        manifest.tests.len()
    );

    let sink = Arc::new(CollectingSink::new().with_echo(format == OutputFormat::Table));
    let cancellation = CancellationToken::new();

    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let engine = ExecutionEngine::new(app.engine_config());
    let result = engine
        .run(descriptors, sink.clone(), cancellation.clone())
        .await;

    let cancelled = match &result {
        Ok(report) => report.cancelled,
        Err(_) => cancellation.is_cancelled(),
    };
    let summary = sink.summary(&manifest.name).with_cancelled(cancelled);

    println!("{}", ResultFormatter::new(format).format_summary(&summary));

    if let Some(output) = &args.output {
        write_results_to_file(output, &summary, format)?;
        println!("✓ Results written to: {}", output.display());
    }

    if args.save {
        let storage = results_storage(&app, None);
        let run = StoredRun::new(summary.clone()).with_config(RunConfig {
            max_parallelism: app.max_parallelism,
            chunk_factor: app.chunk_factor,
            timeout_ms: app.timeout_ms,
            categories: args.categories.clone(),
        });
        let path = storage.save(&run)?;
        println!("✓ Run {} saved to: {}", run.id, path.display());
    }

    result.context("Run aborted")?;
    Ok(summary.has_failures())
}

fn list_plan(mut app: AppConfig, args: cli::ListArgs) -> Result<()> {
    if let Some(max_parallel) = args.max_parallel {
        app.max_parallelism = max_parallel;
    }
    app.validate()?;

    let format = match &args.format {
        Some(name) => output_format(name)?,
        None => OutputFormat::Table,
    };

    let manifest = SuiteManifest::load(&args.suite)?;
    let graph = DependencyGraph::build(manifest.to_descriptors(&args.categories))?;

    info!(
        "Planning suite '{}': {} test(s), {} dependency edge(s)",
        manifest.name,
        graph.len(),
        graph.edge_count()
    );

    let scheduler = BatchScheduler::new(
        graph,
        Arc::new(OutcomeTable::new()),
        app.engine_config().scheduler_config(),
    );
    let plan = scheduler.dry_run();

    print!("{}", ResultFormatter::new(format).format_plan(&plan));
    Ok(())
}

fn show_results(app: AppConfig, args: cli::ResultsArgs) -> Result<()> {
    let storage = results_storage(&app, args.dir.as_deref());

    match args.action {
        cli::ResultsAction::List { suite } => {
            let runs = storage.list_runs(suite.as_deref())?;

            if runs.is_empty() {
                println!("\n📭 No stored results found in {}", storage.base_dir().display());
                println!("   Store a run with: testgraph run --suite <file> --save");
                return Ok(());
            }

            println!("\n┌──────────────────────────────────────────────────────────────────────┐");
            println!("│ Stored Runs                                                          │");
            println!("├──────────────────────────────────────────────────────────────────────┤");
            for run in &runs {
                println!(
                    "│ {:22} │ {:20} │ {:4} tests │ {:5.1}% {} │",
                    run.id,
                    run.suite,
                    run.total,
                    run.pass_rate,
                    if run.has_failures { "✗" } else { "✓" }
                );
            }
            println!("└──────────────────────────────────────────────────────────────────────┘");
        }

        cli::ResultsAction::Show { id, suite, format } => {
            let run = match (id, suite) {
                (Some(id), _) => storage.find(&id)?,
                (None, Some(suite)) => storage
                    .latest(&suite)?
                    .ok_or_else(|| anyhow::anyhow!("No stored runs for suite: {suite}"))?,
                (None, None) => {
                    let latest = storage
                        .list_runs(None)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("No stored runs"))?;
                    storage.find(&latest.id)?
                }
            };

            let format = output_format(&format)?;
            if format == OutputFormat::Table {
                println!("Run ID: {} ({})", run.id, run.started_at.to_rfc3339());
            }
            println!("{}", ResultFormatter::new(format).format_summary(&run.summary));
        }

        cli::ResultsAction::Export { id, output, format } => {
            let run = storage.find(&id)?;
            let format = format
                .as_deref()
                .and_then(ExportFormat::from_str)
                .or_else(|| ExportFormat::from_extension(&output))
                .unwrap_or(ExportFormat::Json);

            storage.export(&run, &output, format)?;
            println!("✓ Run {} exported to: {}", run.id, output.display());
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, resolved: Result<AppConfig>) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
            } else {
                let app = resolved?;
                if let Some(path) = ConfigFile::find() {
                    println!("# from {}", path.display());
                }
                let output = if format == "json" {
                    serde_json::to_string_pretty(&app)?
                } else {
                    serde_yaml::to_string(&app)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Env => {
            print_env_help();
        }
    }

    Ok(())
}
