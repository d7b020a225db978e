//! Metric definitions.
//!
//! A metric is a column selection plus the system prompt the judge grades
//! with. Metrics are read from a YAML file:
//!
//! ```yaml
//! metrics:
//!   - name: Groundedness
//!     columns: [Question, Answer, Content]
//!     system_prompt: |
//!       Rate how well the answer is supported by the content.
//! ```

use crate::error::{JudgeError, Result};
use crate::sheet::Column;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minimum number of columns a metric must select.
pub const MIN_COLUMNS: usize = 2;

/// A single grading metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Display name, e.g. "Metric 1" or "Groundedness".
    #[serde(default)]
    pub name: String,
    /// Columns whose values are placed in the user prompt.
    pub columns: Vec<Column>,
    /// Grading instructions sent as the system message.
    pub system_prompt: String,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = Column>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().collect(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Check the metric and normalize its column list.
    ///
    /// Duplicate columns are collapsed, keeping first-appearance order.
    pub fn validate(&mut self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.columns.len());
        for column in self.columns.drain(..) {
            if !seen.contains(&column) {
                seen.push(column);
            }
        }
        self.columns = seen;

        if self.columns.len() < MIN_COLUMNS {
            return Err(JudgeError::invalid_metric(
                &self.name,
                "you must select at least two columns.",
            ));
        }

        if self.system_prompt.trim().is_empty() {
            return Err(JudgeError::invalid_metric(
                &self.name,
                "the system prompt cannot be empty.",
            ));
        }

        let missing: Vec<Column> = referenced_columns(&self.system_prompt)
            .into_iter()
            .filter(|c| !self.columns.contains(c))
            .collect();

        if !missing.is_empty() {
            let terms: Vec<&str> = missing.iter().map(Column::term).collect();
            let headers: Vec<&str> = missing.iter().map(Column::header).collect();
            return Err(JudgeError::invalid_metric(
                &self.name,
                format!(
                    "the system prompt references '{}', but you need to select these columns: {}.",
                    terms.join(", "),
                    headers.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Selected column headers joined for display.
    pub fn columns_label(&self) -> String {
        self.columns
            .iter()
            .map(Column::header)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Order in which prompt mentions are reported.
const MENTION_ORDER: [Column; 5] = [
    Column::Question,
    Column::Answer,
    Column::Content,
    Column::ReferenceContent,
    Column::ReferenceAnswer,
];

/// Columns a prompt mentions by name: question, answer, content, then the
/// reference columns.
///
/// Matching is a case-insensitive substring search. A mention of
/// "reference answer" does not count as a mention of "answer", and the same
/// holds for "reference content" and "content".
pub fn referenced_columns(prompt: &str) -> Vec<Column> {
    let lower = prompt.to_lowercase();
    let mut matched: Vec<Column> = MENTION_ORDER
        .into_iter()
        .filter(|c| lower.contains(c.term()))
        .collect();

    if matched.contains(&Column::ReferenceAnswer) {
        matched.retain(|c| *c != Column::Answer);
    }
    if matched.contains(&Column::ReferenceContent) {
        matched.retain(|c| *c != Column::Content);
    }

    matched
}

/// An ordered collection of metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub metrics: Vec<MetricDefinition>,
}

impl MetricSet {
    pub fn new(metrics: Vec<MetricDefinition>) -> Self {
        let mut set = Self { metrics };
        set.assign_default_names();
        set
    }

    /// Load metric definitions from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JudgeError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse metric definitions from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut set: MetricSet = serde_yaml::from_str(content)
            .map_err(|e| JudgeError::Serialization(format!("invalid metrics file: {}", e)))?;
        set.assign_default_names();
        Ok(set)
    }

    fn assign_default_names(&mut self) {
        for (i, metric) in self.metrics.iter_mut().enumerate() {
            if metric.name.trim().is_empty() {
                metric.name = format!("Metric {}", i + 1);
            }
        }
    }

    /// Validate every metric, collecting all failures.
    ///
    /// Returns one error per invalid metric; an empty set is itself an error.
    pub fn validate(&mut self) -> std::result::Result<(), Vec<JudgeError>> {
        if self.metrics.is_empty() {
            return Err(vec![JudgeError::InvalidConfig(
                "Please define at least one metric with a valid system prompt and selected columns."
                    .to_string(),
            )]);
        }

        let errors: Vec<JudgeError> = self
            .metrics
            .iter_mut()
            .filter_map(|m| m.validate().err())
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
