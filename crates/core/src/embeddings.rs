use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const OPENAI_EMBEDDING_DIMENSIONS: usize = 1_536;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

/// Hashed trigram embedder, no network.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl OpenAiEmbeddingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: OPENAI_EMBEDDING_DIMENSIONS,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    config: OpenAiEmbeddingConfig,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::Config(
                "embedding API key is not set".to_string(),
            ));
        }
        if config.dimensions == 0 {
            return Err(ServiceError::Config(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "input": text,
        });

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                // 1s, 2s, 4s ...
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1).min(5))).await;
            }

            let sent = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(error) if attempt < self.config.max_retries => {
                    warn!(%error, attempt, "embedding request failed, retrying");
                    attempt += 1;
                    continue;
                }
                Err(error) => return Err(error.into()),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: Value = response.json().await?;
                let vector = parse_embedding_response(&parsed)?;
                if vector.len() != self.config.dimensions {
                    return Err(ServiceError::Config(format!(
                        "model {} returned {} dimensions, index expects {}",
                        self.config.model,
                        vector.len(),
                        self.config.dimensions
                    )));
                }
                return Ok(vector);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.config.max_retries {
                warn!(%status, attempt, "embedding service busy, retrying");
                attempt += 1;
                continue;
            }

            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{status}: {details}"),
            });
        }
    }
}

fn parse_embedding_response(parsed: &Value) -> Result<Vec<f32>, ServiceError> {
    let values = parsed
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "response has no data[0].embedding".to_string(),
        })?;

    values
        .iter()
        .map(|value| {
            value.as_f64().map(|v| v as f32).ok_or_else(|| ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: "embedding contains a non-numeric value".to_string(),
            })
        })
        .collect()
}
