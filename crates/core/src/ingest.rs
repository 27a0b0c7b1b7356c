use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::TextExtractor;
use crate::models::{
    ChunkMetadata, FileReport, IndexedVector, IngestionOptions, IngestionSummary, SourceFile,
};
use crate::traits::{FileSource, VectorIndex};
use crate::IngestError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};
use walkdir::WalkDir;

pub const NO_TEXT_EXTRACTED: &str = "No text extracted";
pub const NO_VALID_CHUNKS: &str = "No valid chunks created";

/// A directory tree exposed as a drive folder.
pub struct LocalFolderSource {
    root: PathBuf,
    listed: RwLock<HashMap<String, PathBuf>>,
}

impl LocalFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listed: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, IngestError> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Ok(root.to_path_buf());
    }

    let path = Path::new(relative);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(IngestError::Validation(format!(
            "path must stay inside the document root: {relative}"
        )));
    }
    Ok(root.join(path))
}

pub fn generate_file_id(relative_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait::async_trait]
impl FileSource for LocalFolderSource {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<SourceFile>, IngestError> {
        let folder = resolve_within(&self.root, folder_id)?;
        if !folder.is_dir() {
            return Err(IngestError::Validation(format!(
                "folder does not exist: {}",
                folder.display()
            )));
        }

        let mut files = Vec::new();
        let mut paths = HashMap::new();
        for entry in WalkDir::new(&folder)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = self.relative_name(entry.path());
            let mime_type = mime_guess::from_path(entry.path())
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            let modified_at = entry
                .metadata()
                .ok()
                .and_then(|metadata| metadata.modified().ok())
                .map(DateTime::<Utc>::from);
            let name = entry
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| IngestError::MissingFileName(relative.clone()))?;

            let file_id = generate_file_id(&relative);
            paths.insert(file_id.clone(), entry.into_path());
            files.push(SourceFile {
                file_id,
                name,
                mime_type,
                modified_at,
            });
        }

        if let Ok(mut listed) = self.listed.write() {
            listed.extend(paths);
        }
        Ok(files)
    }

    async fn file_content(&self, file: &SourceFile) -> Result<Vec<u8>, IngestError> {
        let known = self
            .listed
            .read()
            .ok()
            .and_then(|listed| listed.get(&file.file_id).cloned());
        if let Some(path) = known {
            return Ok(tokio::fs::read(path).await?);
        }

        // not listed by this source yet
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|item| item.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            if generate_file_id(&self.relative_name(entry.path())) == file.file_id {
                return Ok(tokio::fs::read(entry.path()).await?);
            }
        }

        Err(IngestError::InvalidArgument(format!(
            "file {} ({}) not found under {}",
            file.name,
            file.file_id,
            self.root.display()
        )))
    }
}

/// extract → chunk → embed → upsert, one file at a time.
pub struct Ingestor<'a, X, E, V>
where
    X: TextExtractor,
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    extractor: X,
    embedder: &'a E,
    index: &'a V,
    chunking: ChunkingConfig,
    options: IngestionOptions,
}

impl<'a, X, E, V> Ingestor<'a, X, E, V>
where
    X: TextExtractor,
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(extractor: X, embedder: &'a E, index: &'a V) -> Self {
        Self {
            extractor,
            embedder,
            index,
            chunking: ChunkingConfig::default(),
            options: IngestionOptions::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_options(mut self, options: IngestionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn sync_folder<S>(
        &self,
        source: &S,
        folder_id: &str,
    ) -> Result<IngestionSummary, IngestError>
    where
        S: FileSource + ?Sized,
    {
        let files = source.list_files(folder_id).await?;
        if files.is_empty() {
            return Err(IngestError::Validation(format!(
                "no files found in folder {folder_id}"
            )));
        }
        self.ingest_files(source, &files).await
    }

    pub async fn ingest_files<S>(
        &self,
        source: &S,
        files: &[SourceFile],
    ) -> Result<IngestionSummary, IngestError>
    where
        S: FileSource + ?Sized,
    {
        if files.is_empty() {
            return Err(IngestError::Validation("file list is empty".to_string()));
        }
        if self.embedder.dimensions() != self.index.dimensions() {
            return Err(IngestError::Validation(format!(
                "embedder produces {} dimensions but the index holds {}",
                self.embedder.dimensions(),
                self.index.dimensions()
            )));
        }

        let mut processed_files = Vec::with_capacity(files.len());
        for (position, file) in files.iter().enumerate() {
            info!(
                file = %file.name,
                file_id = %file.file_id,
                "[{}/{}] ingesting",
                position + 1,
                files.len()
            );

            let report = match self.ingest_file(source, file).await {
                Ok(chunk_count) => FileReport {
                    name: file.name.clone(),
                    file_id: file.file_id.clone(),
                    chunk_count,
                    error: None,
                },
                Err(error) => {
                    warn!(file = %file.name, %error, "file not indexed");
                    FileReport {
                        name: file.name.clone(),
                        file_id: file.file_id.clone(),
                        chunk_count: 0,
                        error: Some(error.to_string()),
                    }
                }
            };
            processed_files.push(report);
        }

        let failed_file_details: Vec<FileReport> = processed_files
            .iter()
            .filter(|report| !report.succeeded())
            .cloned()
            .collect();

        let summary = IngestionSummary {
            total_files: files.len(),
            total_chunks: processed_files.iter().map(|report| report.chunk_count).sum(),
            processed_files,
            failed_file_details,
        };
        info!(
            total_files = summary.total_files,
            total_chunks = summary.total_chunks,
            failed = summary.failed_file_details.len(),
            "{}",
            summary.message()
        );
        Ok(summary)
    }

    async fn ingest_file<S>(&self, source: &S, file: &SourceFile) -> Result<usize, FileFailure>
    where
        S: FileSource + ?Sized,
    {
        let bytes = source.file_content(file).await?;
        let text = self.extractor.extract(&bytes, &file.mime_type);
        if text.trim().is_empty() {
            return Err(FileFailure::Message(NO_TEXT_EXTRACTED.to_string()));
        }

        let chunks = build_chunks(file, &text, self.chunking)?;
        if chunks.is_empty() {
            return Err(FileFailure::Message(NO_VALID_CHUNKS.to_string()));
        }

        let batch_size = self.options.upsert_batch_size.max(1);
        let namespace = self.options.namespace.as_deref();
        let mut pending = Vec::with_capacity(batch_size.min(chunks.len()));

        for chunk in &chunks {
            let values = self.embedder.embed(&chunk.text).await.map_err(IngestError::from)?;
            pending.push(IndexedVector {
                id: chunk.vector_id(),
                values,
                metadata: ChunkMetadata {
                    file_id: file.file_id.clone(),
                    title: file.name.clone(),
                    text: chunk.text.clone(),
                    chunk_index: chunk.chunk_index,
                    mime_type: file.mime_type.clone(),
                },
            });

            if pending.len() >= batch_size {
                self.index
                    .upsert(&pending, namespace)
                    .await
                    .map_err(IngestError::from)?;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            self.index
                .upsert(&pending, namespace)
                .await
                .map_err(IngestError::from)?;
        }

        Ok(chunks.len())
    }
}

#[derive(Debug, thiserror::Error)]
enum FileFailure {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Error(#[from] IngestError),
}
