//! Writing and displaying evaluation results.
//!
//! Results are saved as CSV (spreadsheet-friendly) or JSON, chosen by the
//! output file extension.

use crate::error::{JudgeError, Result};
use crate::llm::format_number;
use crate::runner::{EvalRecord, MetricSummary};
use std::fs;
use std::path::Path;

/// Default filename for the results file.
pub const DEFAULT_OUTPUT_FILENAME: &str = "relevance_results.csv";

/// Save format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Csv,
        }
    }
}

/// Write records to `path`, creating parent directories as needed.
pub fn write_results(records: &[EvalRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| JudgeError::io(parent, e))?;
        }
    }

    let data = match OutputFormat::from_path(path) {
        OutputFormat::Csv => to_csv(records)?,
        OutputFormat::Json => serde_json::to_string_pretty(records)
            .map_err(|e| JudgeError::Serialization(e.to_string()))?,
    };

    fs::write(path, data).map_err(|e| JudgeError::io(path, e))?;
    tracing::info!(path = %path.display(), records = records.len(), "results written");
    Ok(())
}

/// Render records as CSV text with a header row.
pub fn to_csv(records: &[EvalRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    if records.is_empty() {
        writer.write_record([
            "Metric",
            "Row",
            "Selected Columns",
            "Score",
            "Normalized Score",
            "Criteria",
            "Supporting Evidence",
            "Error",
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| JudgeError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| JudgeError::Serialization(e.to_string()))
}

/// Cut `text` to at most `width` characters, on one line.
fn clip(text: &str, width: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= width {
        flat
    } else {
        let keep = width.saturating_sub(3);
        let mut out: String = flat.chars().take(keep).collect();
        out.push_str("...");
        out
    }
}

fn pad(text: &str, width: usize) -> String {
    let clipped = clip(text, width);
    let fill = width.saturating_sub(clipped.chars().count());
    format!("{}{}", clipped, " ".repeat(fill))
}

/// Render records as a fixed-width text table.
///
/// `width` is the total line width; the criteria and evidence columns share
/// whatever the fixed columns leave over.
pub fn render_table(records: &[EvalRecord], width: usize) -> String {
    const METRIC: usize = 14;
    const ROW: usize = 5;
    const SCORE: usize = 6;
    const SEPARATORS: usize = 3 * 4;

    let flexible = width
        .saturating_sub(METRIC + ROW + SCORE + SEPARATORS)
        .max(20);
    let criteria = flexible / 3;
    let evidence = flexible - criteria;

    let header = format!(
        "{} | {} | {} | {} | {}",
        pad("Metric", METRIC),
        pad("Row", ROW),
        pad("Score", SCORE),
        pad("Criteria", criteria),
        pad("Supporting Evidence", evidence),
    );
    let rule = "─".repeat(header.chars().count());

    let mut lines = vec![header, rule];
    for record in records {
        let score = match (record.score, &record.error) {
            (Some(score), _) => format_number(score),
            (None, Some(_)) => "ERR".to_string(),
            (None, None) => String::new(),
        };
        let evidence_text = record
            .error
            .as_deref()
            .unwrap_or(&record.supporting_evidence);

        lines.push(format!(
            "{} | {} | {} | {} | {}",
            pad(&record.metric, METRIC),
            pad(&record.row.to_string(), ROW),
            pad(&score, SCORE),
            pad(&record.criteria, criteria),
            pad(evidence_text, evidence),
        ));
    }

    lines
        .into_iter()
        .map(|l| l.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render per-metric aggregates.
pub fn render_summary(summaries: &[MetricSummary]) -> String {
    let mut out = String::from("Summary\n");
    out.push_str(&"─".repeat(40));
    out.push('\n');

    for s in summaries {
        let mean = s
            .mean_score
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "n/a".to_string());
        let normalized = s
            .mean_normalized_score
            .map(|m| format!("{:.0}%", m * 100.0))
            .unwrap_or_else(|| "n/a".to_string());

        out.push_str(&format!(
            "  {}: mean {} ({}) over {}/{} rows",
            s.metric, mean, normalized, s.scored, s.rows
        ));
        if s.failed > 0 {
            out.push_str(&format!(", {} failed", s.failed));
        }
        out.push('\n');
    }

    out
}
