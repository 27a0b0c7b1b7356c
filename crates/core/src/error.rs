use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("chunk pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Failures talking to the embedding, chat or vector index backends.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{backend} returned an unusable response: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("bad request: {0}")]
    Request(String),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("backend not available: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fetch failed for {url}: {details}")]
    Fetch { url: String, details: String },

    #[error("html parse error: {0}")]
    ParseError(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
