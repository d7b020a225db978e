//! Error types for sheet-judge.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, JudgeError>;

/// Errors that can occur while loading, validating, or evaluating.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The spreadsheet path does not exist.
    #[error("Spreadsheet not found at '{0}'")]
    SheetNotFound(PathBuf),

    /// The file extension is not a supported spreadsheet format.
    #[error("Unsupported spreadsheet format '{0}' (expected xlsx, xls, xlsb, ods or csv)")]
    UnsupportedFormat(String),

    /// Error reported by the spreadsheet reader.
    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    /// Required header columns are absent.
    #[error("The uploaded file must contain these columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// The sheet has a header but no data rows.
    #[error("Spreadsheet '{0}' has no data rows")]
    EmptySheet(String),

    /// A metric definition failed validation.
    #[error("For {metric}, {reason}")]
    InvalidMetric { metric: String, reason: String },

    /// A column name did not match any known column.
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// The LLM API answered with a non-success status.
    #[error("LLM API returned {status}: {message}")]
    LlmStatus { status: u16, message: String },

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl JudgeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a metric validation error.
    pub fn invalid_metric(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetric {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry of the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Http(_) => true,
            JudgeError::LlmStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for JudgeError {
    fn from(err: serde_json::Error) -> Self {
        JudgeError::LlmParse(err.to_string())
    }
}

impl From<csv::Error> for JudgeError {
    fn from(err: csv::Error) -> Self {
        JudgeError::Spreadsheet(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message() {
        let err = JudgeError::MissingColumns(vec!["Question".into(), "Answer".into()]);
        assert_eq!(
            err.to_string(),
            "The uploaded file must contain these columns: Question, Answer"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(JudgeError::Http("timeout".into()).is_transient());
        let status = |status: u16| JudgeError::LlmStatus {
            status,
            message: "x".into(),
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(401).is_transient());
        assert!(!JudgeError::LlmApi("No choices in response".into()).is_transient());
        assert!(!JudgeError::LlmParse("no score".into()).is_transient());
    }
}
