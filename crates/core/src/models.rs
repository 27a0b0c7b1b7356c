use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document as listed by the external file source. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub file_id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub file_id: String,
    pub chunk_index: u64,
    pub text: String,
}

impl Chunk {
    pub fn vector_id(&self) -> String {
        chunk_vector_id(&self.file_id, self.chunk_index)
    }
}

pub fn chunk_vector_id(file_id: &str, chunk_index: u64) -> String {
    format!("{file_id}-chunk-{chunk_index}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub file_id: String,
    pub title: String,
    pub text: String,
    pub chunk_index: u64,
    pub mime_type: String,
}

impl ChunkMetadata {
    // absent fields read as empty values
    pub fn from_value(value: &Value) -> Self {
        let text_field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            file_id: text_field("fileId"),
            title: text_field("title"),
            text: text_field("text"),
            chunk_index: value
                .get("chunkIndex")
                .and_then(|index| index.as_u64().or_else(|| index.as_f64().map(|f| f as u64)))
                .unwrap_or_default(),
            mime_type: text_field("mimeType"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalMatch {
    pub id: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PdfLink {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    pub file_id: String,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub total_files: usize,
    pub total_chunks: usize,
    pub processed_files: Vec<FileReport>,
    pub failed_file_details: Vec<FileReport>,
}

impl IngestionSummary {
    pub fn message(&self) -> String {
        let failed = self.failed_file_details.len();
        if self.total_chunks == 0 {
            format!(
                "No chunks were created from {} file(s); {} failed",
                self.total_files, failed
            )
        } else if failed == 0 {
            format!(
                "Successfully indexed {} chunks from {} file(s)",
                self.total_chunks, self.total_files
            )
        } else {
            format!(
                "Partially successful: indexed {} chunks from {} of {} file(s); {} failed",
                self.total_chunks,
                self.total_files - failed,
                self.total_files,
                failed
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub text: String,
    pub score: f64,
    pub file_id: String,
    pub chunk_index: u64,
}

impl From<&RetrievalMatch> for Citation {
    fn from(value: &RetrievalMatch) -> Self {
        Self {
            id: value.id.clone(),
            title: value.metadata.title.clone(),
            text: value.metadata.text.clone(),
            score: value.score,
            file_id: value.metadata.file_id.clone(),
            chunk_index: value.metadata.chunk_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedContext {
    pub context: String,
    pub citations: Vec<Citation>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedDocument {
    pub file_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub namespace: Option<String>,
    pub upsert_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            upsert_batch_size: 100,
        }
    }
}
