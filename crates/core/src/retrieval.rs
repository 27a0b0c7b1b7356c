use crate::embeddings::Embedder;
use crate::models::{Citation, ReconstructedDocument, RetrievalMatch, RetrievedContext};
use crate::traits::VectorIndex;
use crate::ServiceError;
use tracing::{debug, warn};

pub const GENERIC_RECONSTRUCTION_QUERY: &str = "document content text information";

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub context_top_k: usize,
    pub reconstruct_top_k: usize,
    pub namespace: Option<String>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            context_top_k: 5,
            reconstruct_top_k: 500,
            namespace: None,
        }
    }
}

pub struct RetrievalService<'a, E, V>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    embedder: &'a E,
    index: &'a V,
    options: RetrievalOptions,
}

impl<'a, E, V> RetrievalService<'a, E, V>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(embedder: &'a E, index: &'a V) -> Self {
        Self {
            embedder,
            index,
            options: RetrievalOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn retrieve_context(&self, query: &str) -> Result<RetrievedContext, ServiceError> {
        if query.trim().is_empty() {
            return Err(ServiceError::Request("query is empty".to_string()));
        }

        let vector = self.embedder.embed(query).await?;
        let matches = self
            .index
            .query(
                &vector,
                self.options.context_top_k,
                self.options.namespace.as_deref(),
            )
            .await?;

        Ok(build_context(&matches))
    }

    pub async fn reconstruct(&self, file_id: &str) -> Result<ReconstructedDocument, ServiceError> {
        if file_id.trim().is_empty() {
            return Err(ServiceError::Request("fileId is empty".to_string()));
        }

        let namespace = self.options.namespace.as_deref();
        let mut owned = self.matches_for_file(file_id, file_id, namespace).await?;

        if owned.is_empty() {
            debug!(file_id, "no chunks near the file id, retrying with a generic query");
            owned = self
                .matches_for_file(file_id, GENERIC_RECONSTRUCTION_QUERY, namespace)
                .await?;
        }

        Ok(assemble_document(file_id, owned))
    }

    async fn matches_for_file(
        &self,
        file_id: &str,
        query: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>, ServiceError> {
        let vector = self.embedder.embed(query).await?;
        let top_k = self.options.reconstruct_top_k;
        let matches = self.index.query(&vector, top_k, namespace).await?;

        if matches.len() >= top_k {
            warn!(
                file_id,
                top_k, "broad query saturated; trailing chunks of large files may be missing"
            );
        }

        Ok(matches
            .into_iter()
            .filter(|hit| hit.metadata.file_id == file_id)
            .collect())
    }
}

pub fn build_context(matches: &[RetrievalMatch]) -> RetrievedContext {
    let context = matches
        .iter()
        .map(|hit| format!("[{}]: {}", hit.metadata.title, hit.metadata.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    RetrievedContext {
        context,
        citations: matches.iter().map(Citation::from).collect(),
        confidence: matches.first().map_or(0.0, |hit| hit.score),
    }
}

/// Orders a file's chunks by index and joins them with blank lines.
pub fn assemble_document(file_id: &str, mut chunks: Vec<RetrievalMatch>) -> ReconstructedDocument {
    chunks.sort_by_key(|hit| hit.metadata.chunk_index);
    chunks.dedup_by_key(|hit| hit.metadata.chunk_index);

    ReconstructedDocument {
        file_id: file_id.to_string(),
        title: chunks
            .first()
            .map(|hit| hit.metadata.title.clone())
            .unwrap_or_default(),
        chunk_count: chunks.len(),
        text: chunks
            .iter()
            .map(|hit| hit.metadata.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{chunk_vector_id, ChunkMetadata, IndexedVector};
    use crate::stores::InMemoryIndex;

    fn hit(file_id: &str, index: u64, score: f64, text: &str) -> RetrievalMatch {
        RetrievalMatch {
            id: chunk_vector_id(file_id, index),
            score,
            metadata: ChunkMetadata {
                file_id: file_id.to_string(),
                title: format!("{file_id}.pdf"),
                text: text.to_string(),
                chunk_index: index,
                mime_type: "application/pdf".to_string(),
            },
        }
    }

    async fn seed(index: &InMemoryIndex, embedder: &CharacterNgramEmbedder, file_id: &str, texts: &[&str]) {
        let vectors: Vec<IndexedVector> = texts
            .iter()
            .enumerate()
            .rev()
            .map(|(position, text)| IndexedVector {
                id: chunk_vector_id(file_id, position as u64),
                values: embedder.embed_sync(text),
                metadata: ChunkMetadata {
                    file_id: file_id.to_string(),
                    title: format!("{file_id}.pdf"),
                    text: text.to_string(),
                    chunk_index: position as u64,
                    mime_type: "application/pdf".to_string(),
                },
            })
            .collect();
        index.upsert(&vectors, None).await.unwrap();
    }

    #[test]
    fn context_is_formatted_in_score_order() {
        let matches = vec![hit("a", 2, 0.9, "first"), hit("b", 0, 0.4, "second")];
        let context = build_context(&matches);

        assert_eq!(context.context, "[a.pdf]: first\n\n[b.pdf]: second");
        assert_eq!(context.confidence, 0.9);
        assert_eq!(context.citations[0].chunk_index, 2);
        assert_eq!(context.citations[1].file_id, "b");
    }

    #[test]
    fn empty_context_has_zero_confidence() {
        let context = build_context(&[]);
        assert_eq!(context.confidence, 0.0);
        assert!(context.context.is_empty());
    }

    #[test]
    fn assembly_sorts_by_chunk_index() {
        let document = assemble_document(
            "a",
            vec![hit("a", 2, 0.1, "three"), hit("a", 0, 0.9, "one"), hit("a", 1, 0.5, "two")],
        );
        assert_eq!(document.text, "one\n\ntwo\n\nthree");
        assert_eq!(document.chunk_count, 3);
        assert_eq!(document.title, "a.pdf");
    }

    #[tokio::test]
    async fn reconstruction_filters_other_files_and_orders_chunks() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        seed(&index, &embedder, "doc-a", &["alpha part", "beta part", "gamma part"]).await;
        seed(&index, &embedder, "doc-b", &["unrelated text"]).await;

        let service = RetrievalService::new(&embedder, &index);
        let document = service.reconstruct("doc-a").await.unwrap();

        assert_eq!(document.chunk_count, 3);
        assert_eq!(document.text, "alpha part\n\nbeta part\n\ngamma part");
    }

    #[tokio::test]
    async fn generic_query_recovers_chunks_crowded_out_by_the_file_id() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        for distractor in 0..5 {
            seed(&index, &embedder, &format!("noise-{distractor}"), &["target"]).await;
        }
        seed(&index, &embedder, "target", &[GENERIC_RECONSTRUCTION_QUERY]).await;

        let options = RetrievalOptions {
            reconstruct_top_k: 3,
            ..RetrievalOptions::default()
        };
        let service = RetrievalService::new(&embedder, &index).with_options(options);

        let direct = service
            .matches_for_file("target", "target", None)
            .await
            .unwrap();
        assert!(direct.is_empty());

        let document = service.reconstruct("target").await.unwrap();
        assert_eq!(document.chunk_count, 1);
        assert_eq!(document.text, GENERIC_RECONSTRUCTION_QUERY);
        assert_eq!(document.title, "target.pdf");
    }

    #[tokio::test]
    async fn unknown_file_reconstructs_to_empty_document() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        seed(&index, &embedder, "doc-a", &["alpha part"]).await;

        let document = RetrievalService::new(&embedder, &index)
            .reconstruct("missing")
            .await
            .unwrap();
        assert_eq!(document.chunk_count, 0);
        assert!(document.text.is_empty());
    }

    #[tokio::test]
    async fn reconstruction_truncates_when_top_k_is_too_small() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        seed(&index, &embedder, "doc-a", &["one chunk", "two chunk", "three chunk"]).await;

        let options = RetrievalOptions {
            reconstruct_top_k: 2,
            ..RetrievalOptions::default()
        };
        let document = RetrievalService::new(&embedder, &index)
            .with_options(options)
            .reconstruct("doc-a")
            .await
            .unwrap();
        assert_eq!(document.chunk_count, 2);
    }

    #[tokio::test]
    async fn context_retrieval_respects_top_k() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        let texts: Vec<String> = (0..8).map(|i| format!("contrast ratio rule {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        seed(&index, &embedder, "doc-a", &refs).await;

        let context = RetrievalService::new(&embedder, &index)
            .retrieve_context("contrast ratio")
            .await
            .unwrap();

        assert_eq!(context.citations.len(), 5);
        assert!(context.confidence > 0.0);
        assert!(context
            .citations
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        let result = RetrievalService::new(&embedder, &index)
            .retrieve_context("  ")
            .await;
        assert!(matches!(result, Err(ServiceError::Request(_))));
    }
}
