use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::Citation;
use crate::retrieval::RetrievalService;
use crate::traits::VectorIndex;
use crate::IngestError;
use serde::Serialize;
use tracing::info;

pub const MAX_HISTORY_MESSAGES: usize = 20;

const SYSTEM_PROMPT: &str = "You are an accessibility assistant helping teams bring documents and \
web content in line with WCAG 2.1 and the ADA. Answer from the document excerpts below when they \
are relevant and name the document you used. If the excerpts do not cover the question, say so and \
answer from general accessibility knowledge.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub sources: Vec<Citation>,
    pub confidence: f64,
}

pub fn system_context(context: &str) -> String {
    if context.is_empty() {
        format!("{SYSTEM_PROMPT}\n\nNo indexed documents matched this question.")
    } else {
        format!("{SYSTEM_PROMPT}\n\nDocument excerpts:\n{context}")
    }
}

/// Answers `message` with retrieved document context and prior turns.
pub async fn answer<E, V, C>(
    retrieval: &RetrievalService<'_, E, V>,
    model: &C,
    message: &str,
    history: &[ChatMessage],
) -> Result<ChatReply, IngestError>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
    C: ChatModel + ?Sized,
{
    if message.trim().is_empty() {
        return Err(IngestError::Validation("message is required".to_string()));
    }

    let retrieved = retrieval.retrieve_context(message).await?;

    let skip = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
    let mut messages: Vec<ChatMessage> = history.iter().skip(skip).cloned().collect();
    messages.push(ChatMessage::user(message));

    let reply = model
        .complete(&messages, Some(&system_context(&retrieved.context)))
        .await?;

    info!(
        sources = retrieved.citations.len(),
        confidence = retrieved.confidence,
        "chat answered"
    );

    Ok(ChatReply {
        reply,
        sources: retrieved.citations,
        confidence: retrieved.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::llm::Role;
    use crate::models::{ChunkMetadata, IndexedVector};
    use crate::stores::InMemoryIndex;
    use crate::ServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<(Vec<ChatMessage>, Option<String>)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            system_context: Option<&str>,
        ) -> Result<String, ServiceError> {
            self.seen
                .lock()
                .unwrap()
                .push((messages.to_vec(), system_context.map(str::to_string)));
            Ok("Use descriptive alt text.".to_string())
        }
    }

    #[tokio::test]
    async fn reply_carries_sources_and_history() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        index
            .upsert(
                &[IndexedVector {
                    id: "f-chunk-0".to_string(),
                    values: embedder.embed_sync("alt text for images"),
                    metadata: ChunkMetadata {
                        file_id: "f".to_string(),
                        title: "Guide.pdf".to_string(),
                        text: "alt text for images".to_string(),
                        chunk_index: 0,
                        mime_type: "application/pdf".to_string(),
                    },
                }],
                None,
            )
            .await
            .unwrap();

        let retrieval = RetrievalService::new(&embedder, &index);
        let model = RecordingModel::default();
        let history = vec![ChatMessage::user("hello"), ChatMessage::assistant("hi")];

        let reply = answer(&retrieval, &model, "how do I write alt text", &history)
            .await
            .unwrap();

        assert_eq!(reply.reply, "Use descriptive alt text.");
        assert_eq!(reply.sources.len(), 1);
        assert!(reply.confidence > 0.0);

        let seen = model.seen.lock().unwrap();
        let (messages, system) = &seen[0];
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::User);
        assert!(system
            .as_deref()
            .is_some_and(|system| system.contains("[Guide.pdf]: alt text for images")));
    }

    #[tokio::test]
    async fn empty_message_is_a_validation_error() {
        let embedder = CharacterNgramEmbedder::default();
        let index = InMemoryIndex::new(embedder.dimensions);
        let retrieval = RetrievalService::new(&embedder, &index);
        let result = answer(&retrieval, &RecordingModel::default(), " ", &[]).await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }
}
