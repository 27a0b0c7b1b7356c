use crate::models::{IndexedVector, RetrievalMatch, SourceFile};
use crate::{IngestError, ServiceError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Writes vectors, replacing any existing entry with the same id.
    async fn upsert(
        &self,
        vectors: &[IndexedVector],
        namespace: Option<&str>,
    ) -> Result<(), ServiceError>;

    /// Nearest neighbours of `vector`, best score first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>, ServiceError>;

    fn dimensions(&self) -> usize;
}

/// An external document collection, e.g. a shared drive folder.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<SourceFile>, IngestError>;

    async fn file_content(&self, file: &SourceFile) -> Result<Vec<u8>, IngestError>;
}
