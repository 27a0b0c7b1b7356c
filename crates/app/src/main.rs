mod server;

use accessdoc_core::{
    answer, CharacterNgramEmbedder, ChatModel, ComplianceAnalyzer, CrawlConfig,
    Embedder, HttpFetcher, InMemoryIndex, Ingestor, LocalFolderSource, MimeExtractor, OpenAiChat,
    OpenAiChatConfig, OpenAiEmbedder, OpenAiEmbeddingConfig, PdfCrawler, PineconeConfig,
    PineconeStore, RetrievalOptions, RetrievalService, ServiceError, VectorIndex,
};
use accessdoc_core::embeddings::OPENAI_EMBEDDING_DIMENSIONS;
use accessdoc_core::{IngestionOptions, IngestionSummary};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    /// Deterministic character trigram embedder, no network.
    Local,
    Openai,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndexKind {
    /// In-process index; contents live as long as the process.
    Memory,
    Pinecone,
}

#[derive(Parser)]
#[command(name = "accessdoc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory exposed as the document drive.
    #[arg(long, env = "DOCS_ROOT", default_value = ".", global = true)]
    docs_root: PathBuf,

    #[arg(long, value_enum, env = "EMBEDDER", default_value = "openai", global = true)]
    embedder: EmbedderKind,

    #[arg(long, value_enum, env = "VECTOR_INDEX", default_value = "pinecone", global = true)]
    index: IndexKind,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1", global = true)]
    openai_base_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small", global = true)]
    embedding_model: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini", global = true)]
    chat_model: String,

    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true, global = true)]
    pinecone_api_key: Option<String>,

    /// Data-plane host of the index, e.g. `my-index-abc123.svc.pinecone.io`.
    #[arg(long, env = "PINECONE_INDEX_HOST", global = true)]
    pinecone_index_host: Option<String>,

    #[arg(long, env = "PINECONE_NAMESPACE", global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every document under a folder of the drive.
    Sync {
        /// Folder relative to the docs root; empty means the root itself.
        #[arg(long, default_value = "")]
        folder: String,
    },
    /// Reassemble an indexed file from its chunks.
    Preview {
        #[arg(long)]
        file_id: String,
    },
    /// Ask a question over the indexed documents.
    Ask {
        #[arg(long)]
        message: String,
    },
    /// Discover PDF links on a website.
    Crawl {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "50")]
        max_pdfs: usize,
    },
    /// Produce accessibility compliance reports for PDFs or URLs.
    Analyze {
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,
        /// Write copies of local PDFs with title and language metadata set.
        #[arg(long, default_value_t = false)]
        remediate: bool,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
        addr: String,
    },
}

/// Clients shared by the CLI commands and the HTTP handlers.
pub struct Services {
    pub embedder: Box<dyn Embedder>,
    pub index: Box<dyn VectorIndex>,
    pub chat: Option<Box<dyn ChatModel>>,
    pub source: LocalFolderSource,
    pub namespace: Option<String>,
}

impl Services {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let api_key = cli.openai_api_key.clone().unwrap_or_default();

        let embedder: Box<dyn Embedder> = match cli.embedder {
            EmbedderKind::Local => Box::new(CharacterNgramEmbedder::default()),
            EmbedderKind::Openai => {
                let mut config = OpenAiEmbeddingConfig::new(api_key.clone());
                config.base_url = cli.openai_base_url.clone();
                config.model = cli.embedding_model.clone();
                config.dimensions = OPENAI_EMBEDDING_DIMENSIONS;
                Box::new(OpenAiEmbedder::new(config)?)
            }
        };

        let index: Box<dyn VectorIndex> = match cli.index {
            IndexKind::Memory => Box::new(InMemoryIndex::new(embedder.dimensions())),
            IndexKind::Pinecone => Box::new(PineconeStore::new(PineconeConfig {
                api_key: cli.pinecone_api_key.clone().unwrap_or_default(),
                index_host: cli.pinecone_index_host.clone().unwrap_or_default(),
                dimensions: embedder.dimensions(),
            })?),
        };

        let chat: Option<Box<dyn ChatModel>> = if api_key.trim().is_empty() {
            warn!("OPENAI_API_KEY is not set; chat and analysis are disabled");
            None
        } else {
            let mut config = OpenAiChatConfig::new(api_key);
            config.base_url = cli.openai_base_url.clone();
            config.model = cli.chat_model.clone();
            Some(Box::new(OpenAiChat::new(config)?))
        };

        Ok(Self {
            embedder,
            index,
            chat,
            source: LocalFolderSource::new(&cli.docs_root),
            namespace: cli.namespace.clone().filter(|ns| !ns.trim().is_empty()),
        })
    }

    pub fn ingestor(&self) -> Ingestor<'_, MimeExtractor, dyn Embedder, dyn VectorIndex> {
        Ingestor::new(MimeExtractor, self.embedder.as_ref(), self.index.as_ref()).with_options(
            IngestionOptions {
                namespace: self.namespace.clone(),
                ..IngestionOptions::default()
            },
        )
    }

    pub fn retrieval(&self) -> RetrievalService<'_, dyn Embedder, dyn VectorIndex> {
        RetrievalService::new(self.embedder.as_ref(), self.index.as_ref()).with_options(
            RetrievalOptions {
                namespace: self.namespace.clone(),
                ..RetrievalOptions::default()
            },
        )
    }

    pub fn chat_model(&self) -> Result<&dyn ChatModel, ServiceError> {
        self.chat
            .as_deref()
            .ok_or_else(|| ServiceError::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

fn sync_report_lines(summary: &IngestionSummary) -> Vec<String> {
    let ok = summary
        .processed_files
        .iter()
        .filter(|report| report.succeeded())
        .map(|report| format!("ok     {} ({} chunks)", report.name, report.chunk_count));
    let failed = summary.failed_file_details.iter().map(|report| {
        format!(
            "failed {}: {}",
            report.name,
            report.error.as_deref().unwrap_or("unknown error")
        )
    });
    ok.chain(failed).chain([summary.message()]).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        embedder = ?cli.embedder,
        index = ?cli.index,
        "accessdoc boot"
    );

    match &cli.command {
        Command::Sync { folder } => {
            let services = Services::from_cli(&cli)?;
            let summary = services
                .ingestor()
                .sync_folder(&services.source, folder)
                .await?;
            for line in sync_report_lines(&summary) {
                println!("{line}");
            }
        }
        Command::Preview { file_id } => {
            let services = Services::from_cli(&cli)?;
            let document = services.retrieval().reconstruct(file_id).await?;
            if document.chunk_count == 0 {
                println!("no chunks indexed for {file_id}");
            } else {
                println!("{} ({} chunks)\n", document.title, document.chunk_count);
                println!("{}", document.text);
            }
        }
        Command::Ask { message } => {
            let services = Services::from_cli(&cli)?;
            let model = services.chat_model()?;
            let reply = answer(&services.retrieval(), model, message, &[]).await?;
            println!("{}\n", reply.reply);
            println!("confidence={:.3}", reply.confidence);
            for source in reply.sources {
                println!(
                    "  [{}] chunk={} score={:.4}",
                    source.title, source.chunk_index, source.score
                );
            }
        }
        Command::Crawl { url, max_pdfs } => {
            let config = CrawlConfig {
                max_pdfs: *max_pdfs,
                ..CrawlConfig::default()
            };
            let fetcher = HttpFetcher::new(&config)?;
            let pdfs = PdfCrawler::new(config, &fetcher).crawl(url).await?;
            for pdf in &pdfs {
                println!("{}  {}", pdf.name, pdf.url);
            }
            println!("{} pdf(s) found", pdfs.len());
        }
        Command::Analyze { inputs, remediate } => {
            let services = Services::from_cli(&cli)?;
            let model = services.chat_model()?;
            let outcomes = ComplianceAnalyzer::new(model, services.source.root())?
                .with_remediation(*remediate)
                .analyze(inputs)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Serve { addr } => {
            let services = Services::from_cli(&cli)?;
            server::run(services, addr).await?;
        }
    }

    Ok(())
}
