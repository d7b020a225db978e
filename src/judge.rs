//! LLM-as-judge grading of a single spreadsheet row.

use crate::config::{EvalConfig, MAX_ATTEMPTS};
use crate::error::{JudgeError, Result};
use crate::llm::{ChatCompletion, Prompts};
use crate::metric::MetricDefinition;
use crate::sheet::{Column, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Order and labels of the column sections in a user prompt.
const PROMPT_SECTIONS: [(Column, &str); 5] = [
    (Column::Question, "question"),
    (Column::Answer, "answer"),
    (Column::ReferenceContent, "reference_content"),
    (Column::ReferenceAnswer, "reference_answer"),
    (Column::Content, "content"),
];

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt`: `base * 2^attempt`, capped at
/// [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Inclusive range the judge is asked to score in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map a raw score onto [0, 1].
    pub fn normalize(&self, score: f64) -> f64 {
        ((score - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        let eval = EvalConfig::default();
        Self::new(eval.min_score, eval.max_score)
    }
}

/// Parsed judge reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Score exactly as the model gave it.
    pub score: f64,
    /// Score mapped onto [0, 1] using the configured range.
    pub normalized_score: f64,
    pub criteria: String,
    pub supporting_evidence: String,
}

/// Build the user prompt for one row of a metric.
///
/// Sections follow a fixed order regardless of how the metric lists its
/// columns, then the reasons template is appended.
pub fn build_user_prompt(metric: &MetricDefinition, row: &Row, range: ScoreRange) -> String {
    let mut prompt = String::new();
    for (column, label) in PROMPT_SECTIONS {
        if metric.columns.contains(&column) {
            prompt.push_str(label);
            prompt.push_str(": ");
            prompt.push_str(row.get(column));
            prompt.push_str("\n\n");
        }
    }
    prompt.push_str(&Prompts::reasons(range.min, range.max));
    prompt
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Label {
    Criteria,
    Evidence,
    Score,
}

/// Split a line into a reply label and the text after it.
///
/// Tolerates markdown decoration such as `**Score:** 2` or `- Criteria: ...`.
fn split_label(line: &str) -> Option<(Label, &str)> {
    let trimmed = line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '#' | '-' | '>' | '_'));

    const LABELS: [(&str, Label); 3] = [
        ("supporting evidence", Label::Evidence),
        ("criteria", Label::Criteria),
        ("score", Label::Score),
    ];

    for (name, label) in LABELS {
        let Some(head) = trimmed.get(..name.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(name) {
            continue;
        }
        let rest = trimmed[name.len()..].trim_start_matches(['*', '_']);
        if let Some(rest) = rest.strip_prefix(':') {
            let rest = rest.trim_start_matches(['*', '_']).trim();
            return Some((label, rest));
        }
    }
    None
}

/// First decimal number appearing in `text`.
fn first_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let start = (0..bytes.len()).find(|&i| {
        bytes[i].is_ascii_digit()
            || (bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    })?;

    let mut end = start + 1;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    text[start..end].parse().ok()
}

/// Parse a judge reply of `Criteria:` / `Supporting Evidence:` / `Score:` lines.
///
/// Criteria and evidence may continue over several lines until the next
/// label. The last `Score:` line wins. A reply without a numeric score is an
/// error; missing criteria or evidence are left empty.
pub fn parse_reply(reply: &str, range: ScoreRange) -> Result<Verdict> {
    let mut criteria: Vec<&str> = Vec::new();
    let mut evidence: Vec<&str> = Vec::new();
    let mut score_text: Option<&str> = None;
    let mut current: Option<Label> = None;

    for line in reply.lines() {
        if let Some((label, rest)) = split_label(line) {
            current = Some(label);
            match label {
                Label::Criteria => {
                    criteria.clear();
                    criteria.push(rest);
                }
                Label::Evidence => {
                    evidence.clear();
                    evidence.push(rest);
                }
                Label::Score => score_text = Some(rest),
            }
            continue;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match current {
            Some(Label::Criteria) => criteria.push(line),
            Some(Label::Evidence) => evidence.push(line),
            _ => {}
        }
    }

    let score_text = score_text
        .ok_or_else(|| JudgeError::LlmParse(format!("no 'Score:' line in reply: {}", reply)))?;
    let score = first_number(score_text).ok_or_else(|| {
        JudgeError::LlmParse(format!("score '{}' is not a number", score_text))
    })?;

    if !range.contains(score) {
        tracing::warn!(
            score,
            min = range.min,
            max = range.max,
            "judge score outside the requested range"
        );
    }

    Ok(Verdict {
        score,
        normalized_score: range.normalize(score),
        criteria: join_nonempty(&criteria),
        supporting_evidence: join_nonempty(&evidence),
    })
}

fn join_nonempty(lines: &[&str]) -> String {
    lines
        .iter()
        .filter(|l| !l.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Grades rows with an LLM.
pub struct LlmJudge<C> {
    client: C,
    range: ScoreRange,
    max_attempts: u32,
    backoff: Duration,
}

impl<C: ChatCompletion> LlmJudge<C> {
    /// Create a new judge with the given client and default settings.
    pub fn new(client: C) -> Self {
        Self::from_config(client, &EvalConfig::default())
    }

    /// Create a judge using the score range and retry count from `eval`.
    pub fn from_config(client: C, eval: &EvalConfig) -> Self {
        Self {
            client,
            range: ScoreRange::new(eval.min_score, eval.max_score),
            max_attempts: eval.max_attempts.clamp(1, MAX_ATTEMPTS),
            backoff: Duration::from_millis(500),
        }
    }

    /// Base delay between attempts; doubled after every failure.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    /// Grade one row for one metric.
    ///
    /// Transport failures, rate limits, server errors and unparsable replies
    /// are retried; anything else fails immediately.
    pub async fn judge(&self, metric: &MetricDefinition, row: &Row) -> Result<Verdict> {
        let prompt = build_user_prompt(metric, row, self.range);

        let mut attempt = 1;
        loop {
            let outcome = match self
                .client
                .complete(Some(metric.system_prompt.as_str()), &prompt)
                .await
            {
                Ok(reply) => parse_reply(&reply, self.range),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(verdict) => return Ok(verdict),
                Err(e) if attempt < self.max_attempts && Self::retryable(&e) => {
                    let delay = backoff_delay(self.backoff, attempt);
                    tracing::warn!(
                        metric = %metric.name,
                        row = row.index,
                        attempt,
                        error = %e,
                        "judge attempt failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn retryable(err: &JudgeError) -> bool {
        err.is_transient() || matches!(err, JudgeError::LlmParse(_))
    }
}
