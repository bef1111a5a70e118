//! Output formatters for test results
//!
//! Provides JSON, Table, CSV and summary output formats.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::models::{RunSummary, TestOutcome, TestRecord};
use crate::scheduler::PlannedBatch;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single test record
    pub fn format_record(&self, record: &TestRecord) -> String {
        match self.format {
            OutputFormat::Table => self.format_record_table(record),
            OutputFormat::Json => serde_json::to_string(record).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Csv => to_csv(None, [csv_fields(record)])
                .map(|line| line.trim_end().to_string())
                .unwrap_or_default(),
            OutputFormat::Summary => record.to_string(),
        }
    }

    fn outcome_label(&self, outcome: TestOutcome) -> String {
        let label = format!("{} {}", outcome.symbol(), outcome);
        if !self.colorize {
            return label;
        }
        let color = match outcome {
            TestOutcome::Passed => "32",
            TestOutcome::Failed | TestOutcome::Error => "31",
            TestOutcome::Skipped => "33",
            TestOutcome::NotRun => "90",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    fn format_record_table(&self, record: &TestRecord) -> String {
        let mut line = format!(
            "{:40} {:9} [{:>6}ms]",
            format!("{}::{}", record.class_name, record.display_name),
            self.outcome_label(record.outcome),
            record.duration_ms
        );
        if let Some(message) = &record.message {
            line.push_str(&format!("  {message}"));
        }
        line
    }

    /// Format a run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => format_summary_csv(summary),
            OutputFormat::Summary => format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Suite: {:52} ║\n", summary.suite));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for record in &summary.results {
            output.push_str(&format!("  {}\n", self.format_record_table(record)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Skip: {:3} | Error: {:3}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms{}\n",
            summary.pass_rate(),
            summary.total_duration_ms,
            if summary.cancelled { " | CANCELLED" } else { "" }
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    /// Format a dry-run plan, one line per batch grouped by round
    pub fn format_plan(&self, plan: &[PlannedBatch]) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let rows: Vec<PlanRow> = plan.iter().map(PlanRow::from).collect();
                if self.format == OutputFormat::JsonPretty {
                    serde_json::to_string_pretty(&rows).unwrap_or_default()
                } else {
                    serde_json::to_string(&rows).unwrap_or_default()
                }
            }
            OutputFormat::Csv => {
                let rows = plan.iter().map(PlanRow::from).map(|row| {
                    vec![
                        row.round.to_string(),
                        row.kind,
                        row.concurrency.to_string(),
                        row.tests.join(" "),
                    ]
                });
                to_csv(Some(&PLAN_CSV_HEADER), rows).unwrap_or_default()
            }
            OutputFormat::Table | OutputFormat::Summary => self.format_plan_table(plan),
        }
    }

    fn format_plan_table(&self, plan: &[PlannedBatch]) -> String {
        let mut output = String::new();
        let mut round = 0;

        for planned in plan {
            if planned.round != round {
                round = planned.round;
                output.push_str(&format!("Round {round}\n"));
            }
            output.push_str(&format!("  {}\n", planned.batch));
            for test in planned.batch.tests() {
                output.push_str(&format!("    - {}\n", test.id));
            }
        }

        let tests: usize = plan.iter().map(|p| p.batch.len()).sum();
        output.push_str(&format!(
            "{} test(s) in {} batch(es) over {} round(s)\n",
            tests,
            plan.len(),
            round
        ));
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

#[derive(Serialize)]
struct PlanRow {
    round: usize,
    kind: String,
    concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusive_group: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    constraint_keys: Vec<String>,
    tests: Vec<String>,
}

impl From<&PlannedBatch> for PlanRow {
    fn from(planned: &PlannedBatch) -> Self {
        let batch = &planned.batch;
        Self {
            round: planned.round,
            kind: batch.kind().to_string(),
            concurrency: batch.concurrency(),
            exclusive_group: batch.exclusive_group().map(str::to_string),
            constraint_keys: batch.constraint_keys().to_vec(),
            tests: batch.tests().iter().map(|t| t.id.to_string()).collect(),
        }
    }
}

const SUMMARY_CSV_HEADER: [&str; 6] = ["id", "class", "name", "outcome", "duration_ms", "message"];
const PLAN_CSV_HEADER: [&str; 4] = ["round", "kind", "concurrency", "tests"];

fn csv_fields(record: &TestRecord) -> Vec<String> {
    vec![
        record.id.to_string(),
        record.class_name.clone(),
        record.display_name.clone(),
        record.outcome.to_string(),
        record.duration_ms.to_string(),
        record.message.clone().unwrap_or_default(),
    ]
}

/// Render rows through `csv::Writer` so separators and quotes inside fields are escaped
fn to_csv<I>(header: Option<&[&str]>, rows: I) -> csv::Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn format_summary_csv(summary: &RunSummary) -> String {
    to_csv(
        Some(&SUMMARY_CSV_HEADER),
        summary.results.iter().map(csv_fields),
    )
    .unwrap_or_default()
}

fn format_summary_brief(summary: &RunSummary) -> String {
    format!(
        "{}: {}/{} passed, {} failed, {} skipped, {} error(s) ({:.1}%) in {}ms",
        summary.suite,
        summary.passed,
        summary.total,
        summary.failed,
        summary.skipped,
        summary.errors,
        summary.pass_rate(),
        summary.total_duration_ms
    )
}

/// Write a run summary to a file
pub fn write_results_to_file(
    path: impl AsRef<Path>,
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<()> {
    let path = path.as_ref();
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
