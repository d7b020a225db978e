//! Configuration for sheet-judge.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{JudgeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Upper bound for `EvalConfig::max_attempts`.
pub const MAX_ATTEMPTS: u32 = 10;

/// Settings for an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Maximum number of LLM requests in flight.
    pub concurrency: usize,
    /// Attempts per row before the row is recorded as failed.
    pub max_attempts: u32,
    /// Lowest score the judge is asked to give.
    pub min_score: f64,
    /// Highest score the judge is asked to give.
    pub max_score: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            min_score: 0.0,
            max_score: 3.0,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Evaluation settings
    pub eval: EvalConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    eval: Option<EvalFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EvalFileSection {
    concurrency: Option<usize>,
    max_attempts: Option<u32>,
    min_score: Option<f64>,
    max_score: Option<f64>,
}

impl Config {
    /// Load configuration from environment variables and a config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY or OPENAI_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (`explicit_path`, else ~/.config/sheet-judge/config.yaml)
    /// 3. Default values
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(JudgeError::Config(format!(
                        "Config file not found at '{}'",
                        path.display()
                    )));
                }
                Self::load_from_file(path)?
            }
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Override values from the environment, using `lookup` to read variables.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Some(api_key) = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = api_key;
        }

        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(tokens) = lookup("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = tokens;
        }

        if let Some(temp) = lookup("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = temp;
        }

        if let Some(concurrency) = lookup("JUDGE_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.eval.concurrency = concurrency;
        }

        if let Some(attempts) = lookup("JUDGE_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.eval.max_attempts = attempts;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JudgeError::io(path, e))?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| JudgeError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(eval) = file_config.eval {
            if let Some(concurrency) = eval.concurrency {
                config.eval.concurrency = concurrency;
            }
            if let Some(max_attempts) = eval.max_attempts {
                config.eval.max_attempts = max_attempts;
            }
            if let Some(min_score) = eval.min_score {
                config.eval.min_score = min_score;
            }
            if let Some(max_score) = eval.max_score {
                config.eval.max_score = max_score;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sheet-judge")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(JudgeError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(JudgeError::Config(
                "LLM API key is required. Set LLM_API_KEY (or OPENAI_API_KEY) or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(JudgeError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        self.eval.validate()
    }

    #[cfg(test)]
    pub(crate) fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            eval: EvalConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Check run settings for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(JudgeError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            return Err(JudgeError::InvalidConfig(format!(
                "max_attempts must be between 1 and {}",
                MAX_ATTEMPTS
            )));
        }
        if !(self.max_score > self.min_score) {
            return Err(JudgeError::InvalidConfig(format!(
                "max_score ({}) must be greater than min_score ({})",
                self.max_score, self.min_score
            )));
        }
        Ok(())
    }
}
