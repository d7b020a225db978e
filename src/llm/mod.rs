//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for chat completions, the
//! [`ChatCompletion`] seam the judge is generic over, and the prompt text
//! used for grading.

mod client;
mod prompts;

pub use client::{LlmClient, Message, Role};
pub use prompts::Prompts;
pub(crate) use prompts::format_number;

use crate::error::Result;
use std::future::Future;

/// Anything that can answer a system + user prompt pair with text.
pub trait ChatCompletion {
    fn complete(
        &self,
        system: Option<&str>,
        user: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}
