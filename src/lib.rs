//! Sheet Judge - LLM-as-judge scoring for question/answer spreadsheets.
//!
//! Load a spreadsheet of question/answer/context rows, describe one or more
//! metrics (a column selection plus a grading prompt), and have an
//! OpenAI-compatible model score every row with a short explanation.
//!
//! # Quick Start
//!
//! ```no_run
//! use sheet_judge::{
//!     config::Config,
//!     judge::LlmJudge,
//!     llm::LlmClient,
//!     metric::MetricSet,
//!     report::write_results,
//!     runner::Evaluation,
//!     sheet::Sheet,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!
//!     let sheet = Sheet::load(Path::new("questions.xlsx"), None)?;
//!     let metrics = MetricSet::load(Path::new("metrics.yaml"))?;
//!
//!     let client = LlmClient::new(config.llm.clone())?;
//!     let judge = LlmJudge::from_config(client, &config.eval);
//!     let evaluation = Evaluation::new(judge, config.eval.concurrency);
//!
//!     let output = evaluation.run(&sheet, &metrics, |_, _| {}).await?;
//!     write_results(&output.records, Path::new("relevance_results.csv"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Sheet**: spreadsheet rows keyed by the five known columns
//! - **MetricDefinition**: column selection plus system prompt, with validation
//! - **LlmClient**: OpenAI-compatible chat completion client
//! - **LlmJudge**: builds the per-row prompt and parses the labelled reply
//! - **Evaluation**: runs every metric over every row with bounded concurrency
//! - **report**: CSV/JSON output and terminal rendering

pub mod config;
pub mod error;
pub mod judge;
pub mod llm;
pub mod metric;
pub mod report;
pub mod runner;
pub mod sheet;

// Re-export commonly used types
pub use config::Config;
pub use error::{JudgeError, Result};
pub use judge::{LlmJudge, Verdict};
pub use llm::LlmClient;
pub use metric::{MetricDefinition, MetricSet};
pub use report::write_results;
pub use runner::{EvalRecord, Evaluation};
pub use sheet::{Column, Sheet};
