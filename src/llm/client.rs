//! OpenAI-compatible LLM client.
//!
//! Works with any endpoint that speaks the `/v1/chat/completions` protocol.

use super::ChatCompletion;
use crate::config::LlmConfig;
use crate::error::{JudgeError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Model name requests are sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request and return the first choice's text.
    ///
    /// A `null` content in the reply is returned as an empty string.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Prefer the structured error message when there is one
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|api_error| api_error.error.message)
                .unwrap_or(body);
            return Err(JudgeError::LlmStatus {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| JudgeError::LlmApi("No choices in response".to_string()))?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat completion finished"
            );
        }

        Ok(choice.message.content.unwrap_or_default())
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        self.chat(messages).await
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(JudgeError::LlmApi(format!(
                "Unexpected response: {}",
                response
            )))
        }
    }
}

impl ChatCompletion for LlmClient {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        LlmClient::complete(self, system, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let sys = Message::system("You are helpful.");
        let user = Message::user("Hello!");

        assert!(matches!(sys.role, Role::System));
        assert!(matches!(user.role, Role::User));
        assert_eq!(user.content, "Hello!");
    }

    #[test]
    fn test_endpoint_construction() {
        let config = LlmConfig {
            api_base: "https://api.example.com/".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        };
        let client = LlmClient::new(config).unwrap();
        assert_eq!(client.model(), "gpt-4");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");

        // Without trailing slash
        let config2 = LlmConfig {
            api_base: "https://api.example.com".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4".to_string(),
            ..Default::default()
        };
        let client2 = LlmClient::new(config2).unwrap();
        assert_eq!(client2.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::system("Grade it."), Message::user("question: q")],
            max_tokens: Some(256),
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "question: q");
        assert_eq!(json["max_tokens"], 256);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_with_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let completion: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(completion.choices[0].message.content.is_none());
        assert!(completion.usage.is_none());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert!(serde_json::from_str::<Role>("\"assistant\"").is_err());
    }
}
