pub mod chat;
pub mod chunking;
pub mod compliance;
pub mod crawler;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use chat::{answer, ChatReply};
pub use chunking::{build_chunks, chunk_text, ChunkingConfig};
pub use compliance::{
    parse_compliance_report, remediate_pdf_metadata, ComplianceAnalyzer, ComplianceOutcome,
    ComplianceReport,
};
pub use crawler::{CrawlConfig, HttpFetcher, PageFetcher, PdfCrawler};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, OpenAiEmbeddingConfig,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{CrawlError, IngestError, ServiceError};
pub use extractor::{extract_text, MimeExtractor, TextExtractor};
pub use ingest::{Ingestor, LocalFolderSource};
pub use llm::{ChatMessage, ChatModel, OpenAiChat, OpenAiChatConfig};
pub use models::{
    Chunk, Citation, FileReport, IndexedVector, IngestionOptions, IngestionSummary, PdfLink,
    ReconstructedDocument, RetrievalMatch, RetrievedContext, SourceFile,
};
pub use retrieval::{RetrievalOptions, RetrievalService};
pub use stores::{InMemoryIndex, PineconeConfig, PineconeStore};
pub use traits::{FileSource, VectorIndex};
