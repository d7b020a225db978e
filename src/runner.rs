//! Evaluation runs: every metric against every row.

use crate::error::Result;
use crate::judge::LlmJudge;
use crate::llm::ChatCompletion;
use crate::metric::{MetricDefinition, MetricSet};
use crate::sheet::{Row, Sheet};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of grading one row for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    #[serde(rename = "Metric")]
    pub metric: String,
    /// One-based data row number.
    #[serde(rename = "Row")]
    pub row: usize,
    #[serde(rename = "Selected Columns")]
    pub selected_columns: String,
    #[serde(rename = "Score")]
    pub score: Option<f64>,
    #[serde(rename = "Normalized Score")]
    pub normalized_score: Option<f64>,
    #[serde(rename = "Criteria")]
    pub criteria: String,
    #[serde(rename = "Supporting Evidence")]
    pub supporting_evidence: String,
    #[serde(rename = "Error")]
    pub error: Option<String>,
}

impl EvalRecord {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-metric aggregate of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub rows: usize,
    pub scored: usize,
    pub failed: usize,
    pub mean_score: Option<f64>,
    pub mean_normalized_score: Option<f64>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Records in metric-major, row-minor order.
    pub records: Vec<EvalRecord>,
    pub elapsed: Duration,
}

impl RunOutput {
    /// Aggregate records per metric, in first-appearance order.
    pub fn summarize(&self) -> Vec<MetricSummary> {
        summarize(&self.records)
    }

    pub fn failures(&self) -> usize {
        self.records.iter().filter(|r| r.is_failure()).count()
    }
}

/// Aggregate records per metric, in first-appearance order.
pub fn summarize(records: &[EvalRecord]) -> Vec<MetricSummary> {
    let mut names: Vec<&str> = Vec::new();
    for record in records {
        if !names.contains(&record.metric.as_str()) {
            names.push(&record.metric);
        }
    }

    names
        .into_iter()
        .map(|name| {
            let of_metric: Vec<&EvalRecord> =
                records.iter().filter(|r| r.metric == name).collect();
            let scores: Vec<f64> = of_metric.iter().filter_map(|r| r.score).collect();
            let normalized: Vec<f64> =
                of_metric.iter().filter_map(|r| r.normalized_score).collect();

            MetricSummary {
                metric: name.to_string(),
                rows: of_metric.len(),
                scored: scores.len(),
                failed: of_metric.iter().filter(|r| r.is_failure()).count(),
                mean_score: mean(&scores),
                mean_normalized_score: mean(&normalized),
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Runs metrics over a sheet with bounded concurrency.
pub struct Evaluation<C> {
    judge: LlmJudge<C>,
    concurrency: usize,
}

impl<C: ChatCompletion> Evaluation<C> {
    pub fn new(judge: LlmJudge<C>, concurrency: usize) -> Self {
        Self {
            judge,
            concurrency: concurrency.max(1),
        }
    }

    /// Evaluate every metric against every row.
    ///
    /// All metrics are validated before any request is made. A row that
    /// fails to grade becomes a record with `error` set; the run goes on.
    /// `on_progress` is called with (completed, total) after each record.
    pub async fn run(
        &self,
        sheet: &Sheet,
        metrics: &MetricSet,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<RunOutput> {
        for metric in &metrics.metrics {
            metric.clone().validate()?;
        }

        let start = Instant::now();
        let total = metrics.len() * sheet.len();
        tracing::info!(
            metrics = metrics.len(),
            rows = sheet.len(),
            concurrency = self.concurrency,
            "starting evaluation"
        );

        let tasks = metrics
            .metrics
            .iter()
            .flat_map(|metric| sheet.rows.iter().map(move |row| (metric, row)));

        let mut completed = 0;
        let records: Vec<EvalRecord> = futures::stream::iter(tasks)
            .map(|(metric, row)| self.grade(metric, row))
            .buffered(self.concurrency)
            .inspect(|_| {
                completed += 1;
                on_progress(completed, total);
            })
            .collect()
            .await;

        let elapsed = start.elapsed();
        tracing::info!(records = records.len(), ?elapsed, "evaluation finished");

        Ok(RunOutput { records, elapsed })
    }

    async fn grade(&self, metric: &MetricDefinition, row: &Row) -> EvalRecord {
        let mut record = EvalRecord {
            metric: metric.name.clone(),
            row: row.index + 1,
            selected_columns: metric.columns_label(),
            score: None,
            normalized_score: None,
            criteria: String::new(),
            supporting_evidence: String::new(),
            error: None,
        };

        match self.judge.judge(metric, row).await {
            Ok(verdict) => {
                record.score = Some(verdict.score);
                record.normalized_score = Some(verdict.normalized_score);
                record.criteria = verdict.criteria;
                record.supporting_evidence = verdict.supporting_evidence;
            }
            Err(e) => {
                tracing::warn!(metric = %metric.name, row = record.row, error = %e, "row failed");
                record.error = Some(e.to_string());
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JudgeError;
    use crate::sheet::Column;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores by the answer text; "boom" fails with a permanent error.
    struct ByAnswer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ByAnswer {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl ChatCompletion for ByAnswer {
        async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let answer = user
                .lines()
                .find_map(|l| l.strip_prefix("answer: "))
                .unwrap_or("");
            match answer {
                "boom" => Err(JudgeError::LlmStatus {
                    status: 400,
                    message: "bad request".into(),
                }),
                score => Ok(format!(
                    "Criteria: c\nSupporting Evidence: e\nScore: {}",
                    score
                )),
            }
        }
    }

    fn sheet(answers: &[&str]) -> Sheet {
        let mut table = vec![
            Column::ALL
                .iter()
                .map(|c| c.header().to_string())
                .collect::<Vec<_>>(),
        ];
        for answer in answers {
            table.push(vec![
                "q".to_string(),
                "c".to_string(),
                answer.to_string(),
                "rc".to_string(),
                "ra".to_string(),
            ]);
        }
        Sheet::from_table("test", table).unwrap()
    }

    fn metrics() -> MetricSet {
        MetricSet::new(vec![
            MetricDefinition::new("", [Column::Question, Column::Answer], "Grade the answer."),
            MetricDefinition::new(
                "Faithfulness",
                [Column::Answer, Column::Content],
                "Is the answer supported by the content?",
            ),
        ])
    }

    #[tokio::test]
    async fn test_run_orders_records_and_keeps_failures() {
        let evaluation = Evaluation::new(LlmJudge::new(ByAnswer::new()), 3);
        let mut progress = Vec::new();

        let output = evaluation
            .run(&sheet(&["1", "boom", "3"]), &metrics(), |done, total| {
                progress.push((done, total))
            })
            .await
            .unwrap();

        let order: Vec<(&str, usize)> = output
            .records
            .iter()
            .map(|r| (r.metric.as_str(), r.row))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Metric 1", 1),
                ("Metric 1", 2),
                ("Metric 1", 3),
                ("Faithfulness", 1),
                ("Faithfulness", 2),
                ("Faithfulness", 3),
            ]
        );

        assert_eq!(output.records[0].score, Some(1.0));
        assert_eq!(output.records[0].selected_columns, "Question, Answer");
        assert!(output.records[1].score.is_none());
        assert!(output.records[1].error.as_deref().unwrap().contains("bad request"));
        assert_eq!(output.failures(), 2);
        assert_eq!(progress.len(), 6);
        assert_eq!(progress.last(), Some(&(6, 6)));
    }

    #[tokio::test]
    async fn test_run_respects_concurrency() {
        let client = ByAnswer::new();
        let evaluation = Evaluation::new(LlmJudge::new(client), 2);

        evaluation
            .run(&sheet(&["1", "2", "3", "1", "2"]), &metrics(), |_, _| {})
            .await
            .unwrap();

        let peak = evaluation.judge.client().peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak in-flight requests was {peak}");
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_metric_before_calling() {
        let evaluation = Evaluation::new(LlmJudge::new(ByAnswer::new()), 1);
        let invalid = MetricSet::new(vec![MetricDefinition::new(
            "",
            [Column::Question],
            "Grade.",
        )]);

        let result = evaluation.run(&sheet(&["1"]), &invalid, |_, _| {}).await;
        assert!(result.is_err());
        assert_eq!(evaluation.judge.client().peak.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_summarize() {
        let record = |metric: &str, score: Option<f64>| EvalRecord {
            metric: metric.to_string(),
            row: 1,
            selected_columns: String::new(),
            score,
            normalized_score: score.map(|s| s / 3.0),
            criteria: String::new(),
            supporting_evidence: String::new(),
            error: score.is_none().then(|| "failed".to_string()),
        };

        let summaries = summarize(&[
            record("A", Some(3.0)),
            record("A", Some(1.0)),
            record("A", None),
            record("B", None),
        ]);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].metric, "A");
        assert_eq!(summaries[0].rows, 3);
        assert_eq!(summaries[0].scored, 2);
        assert_eq!(summaries[0].failed, 1);
        assert_eq!(summaries[0].mean_score, Some(2.0));
        assert_eq!(summaries[1].mean_score, None);
    }
}
