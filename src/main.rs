//! Sheet Judge CLI
//!
//! Scores spreadsheet rows against user-defined metrics with an LLM judge.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sheet_judge::{
    config::Config,
    judge::LlmJudge,
    llm::LlmClient,
    metric::MetricSet,
    report::{DEFAULT_OUTPUT_FILENAME, render_summary, render_table, write_results},
    runner::Evaluation,
    sheet::{Column, Sheet},
};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sheet Judge - score question/answer spreadsheets with an LLM judge
#[derive(Parser)]
#[command(name = "sheet-judge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show progress and info-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a spreadsheet's columns and show its first rows
    Preview {
        /// Spreadsheet file (xlsx, xls, xlsb, ods or csv)
        sheet: PathBuf,

        /// Worksheet name (defaults to the first sheet)
        #[arg(long = "sheet", value_name = "NAME")]
        sheet_name: Option<String>,

        /// Number of rows to show
        #[arg(short = 'n', long, default_value_t = 5)]
        rows: usize,
    },

    /// Validate metric definitions without calling the LLM
    Validate {
        /// Metrics file (YAML)
        #[arg(short, long)]
        metrics: PathBuf,
    },

    /// Score every row of a spreadsheet for every metric
    Run {
        /// Spreadsheet file (xlsx, xls, xlsb, ods or csv)
        sheet: PathBuf,

        /// Metrics file (YAML)
        #[arg(short, long)]
        metrics: PathBuf,

        /// Output file (.csv or .json)
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILENAME)]
        output: PathBuf,

        /// Worksheet name (defaults to the first sheet)
        #[arg(long = "sheet", value_name = "NAME")]
        sheet_name: Option<String>,

        /// Only evaluate the first N rows
        #[arg(long)]
        limit: Option<usize>,

        /// Maximum concurrent LLM requests
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Override the model name
        #[arg(long)]
        model: Option<String>,

        /// Terminal width for the results table
        #[arg(long, default_value_t = 120)]
        width: usize,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Preview {
            sheet,
            sheet_name,
            rows,
        } => cmd_preview(sheet, sheet_name, rows),
        Commands::Validate { metrics } => cmd_validate(metrics),
        Commands::Run {
            sheet,
            metrics,
            output,
            sheet_name,
            limit,
            concurrency,
            model,
            width,
        } => {
            let opts = RunOptions {
                sheet_name,
                limit,
                concurrency,
                model,
                width,
                verbose: cli.verbose,
            };
            cmd_run(config_path, sheet, metrics, output, opts).await
        }
        Commands::Test => cmd_test(config_path).await,
    }
}

fn cmd_preview(path: PathBuf, sheet_name: Option<String>, rows: usize) -> Result<()> {
    let sheet = Sheet::load(&path, sheet_name.as_deref())
        .with_context(|| format!("Failed to load spreadsheet '{}'", path.display()))?;

    println!("Sheet: {} ({} rows)", sheet.name, sheet.len());
    println!("Columns: all required columns present");
    println!("{}", "─".repeat(60));

    for row in sheet.preview(rows) {
        println!("Row {}", row.index + 1);
        for column in Column::ALL {
            let value: String = row.get(column).chars().take(80).collect();
            let value = value.replace('\n', " ");
            println!("  {:<18} {}", format!("{}:", column), value);
        }
        println!();
    }

    Ok(())
}

/// Load metrics and print a line per metric; fails if any is invalid.
fn load_valid_metrics(path: &Path) -> Result<MetricSet> {
    let mut metrics = MetricSet::load(path)
        .with_context(|| format!("Failed to load metrics from '{}'", path.display()))?;

    if let Err(errors) = metrics.validate() {
        for error in &errors {
            println!("  ✗ {}", error);
        }
        anyhow::bail!(
            "{} of {} metric definitions are invalid",
            errors.len(),
            metrics.len().max(1)
        );
    }

    Ok(metrics)
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    println!("Validating metrics in {}", path.display());
    let metrics = load_valid_metrics(&path)?;

    for metric in &metrics.metrics {
        println!(
            "  ✓ {} [{}] system prompt is valid.",
            metric.name,
            metric.columns_label()
        );
    }
    Ok(())
}

struct RunOptions {
    sheet_name: Option<String>,
    limit: Option<usize>,
    concurrency: Option<usize>,
    model: Option<String>,
    width: usize,
    verbose: bool,
}

async fn cmd_run(
    config_path: Option<&Path>,
    sheet_path: PathBuf,
    metrics_path: PathBuf,
    output: PathBuf,
    opts: RunOptions,
) -> Result<()> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(model) = opts.model {
        config.llm.model = model;
    }
    if let Some(concurrency) = opts.concurrency {
        config.eval.concurrency = concurrency;
    }
    config.validate().context("Invalid configuration")?;

    let mut sheet = Sheet::load(&sheet_path, opts.sheet_name.as_deref())
        .with_context(|| format!("Failed to load spreadsheet '{}'", sheet_path.display()))?;
    if let Some(limit) = opts.limit {
        sheet.truncate(limit);
    }
    if sheet.is_empty() {
        anyhow::bail!("No rows left to evaluate after applying --limit");
    }

    let metrics = load_valid_metrics(&metrics_path)?;

    println!(
        "Evaluating {} rows x {} metrics with {} ({} concurrent)",
        sheet.len(),
        metrics.len(),
        config.llm.model,
        config.eval.concurrency
    );

    let client = LlmClient::new(config.llm.clone()).context("Failed to create LLM client")?;
    let judge = LlmJudge::from_config(client, &config.eval);
    let evaluation = Evaluation::new(judge, config.eval.concurrency);

    let verbose = opts.verbose;
    let result = evaluation
        .run(&sheet, &metrics, |done, total| {
            if verbose {
                eprint!("\r  {}/{} graded", done, total);
                let _ = std::io::stderr().flush();
                if done == total {
                    eprintln!();
                }
            }
        })
        .await
        .context("Evaluation failed")?;

    println!();
    println!("Results:");
    println!("{}", render_table(&result.records, opts.width));
    println!();
    print!("{}", render_summary(&result.summarize()));

    write_results(&result.records, &output).context("Failed to write results")?;

    println!();
    println!(
        "Wrote {} results to {} in {:.2?}",
        result.records.len(),
        output.display(),
        result.elapsed
    );
    if result.failures() > 0 {
        println!(
            "{} rows failed; see the Error column for details.",
            result.failures()
        );
    }

    Ok(())
}

async fn cmd_test(config_path: Option<&Path>) -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    let key_prefix: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_prefix);
    println!();

    config.validate().context("Invalid configuration")?;

    let client = LlmClient::new(config.llm).context("Failed to create LLM client")?;

    println!("Sending test request...");
    if let Err(e) = client.test_connection().await {
        anyhow::bail!("Connection failed: {}", e);
    }

    println!("Connection successful!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "llm:\n  api_base: http://127.0.0.1:1\n  api_key: test-key\n  timeout_secs: 5\n",
        )
        .unwrap();

        let err = cmd_test(Some(&path)).await.unwrap_err();
        assert!(err.to_string().starts_with("Connection failed"));
    }
}
