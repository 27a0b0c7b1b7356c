use crate::models::{ChunkMetadata, IndexedVector, RetrievalMatch};
use crate::traits::VectorIndex;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

const BACKEND: &str = "pinecone";

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_host: String,
    pub dimensions: usize,
}

/// Data-plane client for a Pinecone-compatible serverless index.
pub struct PineconeStore {
    endpoint: String,
    api_key: String,
    client: Client,
    vector_size: usize,
}

impl PineconeStore {
    pub fn new(config: PineconeConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::Config("PINECONE_API_KEY is not set".to_string()));
        }
        let host = config.index_host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(ServiceError::Config(
                "PINECONE_INDEX_HOST is not set".to_string(),
            ));
        }
        if config.dimensions == 0 {
            return Err(ServiceError::Config(
                "index dimensions must be positive".to_string(),
            ));
        }

        let endpoint = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        url::Url::parse(&endpoint)?;

        Ok(Self {
            endpoint,
            api_key: config.api_key,
            client: Client::new(),
            vector_size: config.dimensions,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), ServiceError> {
        if vector.len() != self.vector_size {
            return Err(ServiceError::Config(format!(
                "vector dimension {} != index dimension {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }
}

pub(crate) fn upsert_body(vectors: &[IndexedVector], namespace: Option<&str>) -> Value {
    let vectors: Vec<Value> = vectors
        .iter()
        .map(|vector| {
            json!({
                "id": vector.id,
                "values": vector.values,
                "metadata": vector.metadata,
            })
        })
        .collect();

    match namespace {
        Some(namespace) => json!({ "vectors": vectors, "namespace": namespace }),
        None => json!({ "vectors": vectors }),
    }
}

pub(crate) fn query_body(vector: &[f32], top_k: usize, namespace: Option<&str>) -> Value {
    let mut body = json!({
        "vector": vector,
        "topK": top_k,
        "includeMetadata": true,
        "includeValues": false,
    });
    if let Some(namespace) = namespace {
        body["namespace"] = json!(namespace);
    }
    body
}

pub(crate) fn parse_matches(parsed: &Value) -> Vec<RetrievalMatch> {
    let hits = parsed
        .pointer("/matches")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut matches: Vec<RetrievalMatch> = hits
        .iter()
        .map(|hit| RetrievalMatch {
            id: hit
                .pointer("/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
            metadata: hit
                .pointer("/metadata")
                .map(ChunkMetadata::from_value)
                .unwrap_or_else(|| ChunkMetadata::from_value(&Value::Null)),
        })
        .collect();

    matches.sort_by(|left, right| right.score.total_cmp(&left.score));
    matches
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(
        &self,
        vectors: &[IndexedVector],
        namespace: Option<&str>,
    ) -> Result<(), ServiceError> {
        if vectors.is_empty() {
            return Ok(());
        }
        for vector in vectors {
            self.check_dimensions(&vector.values)?;
        }

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&upsert_body(vectors, namespace))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        debug!(count = vectors.len(), namespace, "upserted vectors");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>, ServiceError> {
        self.check_dimensions(vector)?;

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("Api-Key", &self.api_key)
            .json(&query_body(vector, top_k, namespace))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parse_matches(&parsed))
    }

    fn dimensions(&self) -> usize {
        self.vector_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PineconeConfig {
        PineconeConfig {
            api_key: "key".to_string(),
            index_host: "docs-abc123.svc.pinecone.io/".to_string(),
            dimensions: 3,
        }
    }

    #[test]
    fn missing_api_key_fails_at_construction() {
        let result = PineconeStore::new(PineconeConfig {
            api_key: String::new(),
            ..config()
        });
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[test]
    fn missing_host_fails_at_construction() {
        let result = PineconeStore::new(PineconeConfig {
            index_host: " ".to_string(),
            ..config()
        });
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[test]
    fn host_without_scheme_gets_https() {
        let store = PineconeStore::new(config()).unwrap();
        assert_eq!(store.endpoint(), "https://docs-abc123.svc.pinecone.io");
    }

    #[test]
    fn upsert_body_carries_metadata_and_namespace() {
        let vector = IndexedVector {
            id: "f-chunk-0".to_string(),
            values: vec![0.1, 0.2, 0.3],
            metadata: ChunkMetadata {
                file_id: "f".to_string(),
                title: "Guide".to_string(),
                text: "hello".to_string(),
                chunk_index: 0,
                mime_type: "text/plain".to_string(),
            },
        };

        let body = upsert_body(&[vector], Some("docs"));
        assert_eq!(body["namespace"], "docs");
        assert_eq!(body["vectors"][0]["id"], "f-chunk-0");
        assert_eq!(body["vectors"][0]["metadata"]["fileId"], "f");
        assert_eq!(body["vectors"][0]["metadata"]["chunkIndex"], 0);

        let without = upsert_body(&[], None);
        assert!(without.get("namespace").is_none());
    }

    #[test]
    fn query_body_requests_metadata() {
        let body = query_body(&[1.0, 0.0, 0.0], 500, None);
        assert_eq!(body["topK"], 500);
        assert_eq!(body["includeMetadata"], true);
        assert!(body.get("namespace").is_none());
    }

    #[test]
    fn matches_are_sorted_by_score() {
        let parsed = json!({
            "matches": [
                {"id": "b", "score": 0.2, "metadata": {"fileId": "f", "chunkIndex": 1.0, "text": "two"}},
                {"id": "a", "score": 0.9, "metadata": {"fileId": "f", "chunkIndex": 0.0, "text": "one"}},
                {"id": "c", "score": 0.5}
            ]
        });

        let matches = parse_matches(&parsed);
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(matches[2].metadata.chunk_index, 1);
        assert_eq!(matches[1].metadata.file_id, "");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_before_sending() {
        let store = PineconeStore::new(config()).unwrap();
        let result = store.query(&[1.0, 2.0], 5, None).await;
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
