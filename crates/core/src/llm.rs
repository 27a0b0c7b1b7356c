use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_context: Option<&str>,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl OpenAiChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 2_000,
            timeout_secs: 120,
        }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    config: OpenAiChatConfig,
    client: Client,
}

impl OpenAiChat {
    pub fn new(config: OpenAiChatConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::Config("chat API key is not set".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

pub(crate) fn request_body(
    config: &OpenAiChatConfig,
    messages: &[ChatMessage],
    system_context: Option<&str>,
) -> Value {
    let mut all = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system_context.filter(|system| !system.trim().is_empty()) {
        all.push(ChatMessage::system(system));
    }
    all.extend(messages.iter().cloned());

    json!({
        "model": config.model,
        "messages": all,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
    })
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_context: Option<&str>,
    ) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&request_body(&self.config, messages, system_context))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: "chat".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: "chat".to_string(),
                details: "response has no choices[0].message.content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_context_is_prepended() {
        let config = OpenAiChatConfig::new("key");
        let body = request_body(
            &config,
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            Some("You are helpful."),
        );

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["content"], "hello");
    }

    #[test]
    fn blank_system_context_is_skipped() {
        let config = OpenAiChatConfig::new("key");
        let body = request_body(&config, &[ChatMessage::user("hi")], Some("  "));
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(matches!(
            OpenAiChat::new(OpenAiChatConfig::new("")),
            Err(ServiceError::Config(_))
        ));
    }
}
