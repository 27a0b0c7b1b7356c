mod engine;
pub mod fetcher;
pub mod parser;

pub use engine::PdfCrawler;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use parser::{extract_links, is_pdf_candidate, normalize_url, pdf_name};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; accessdoc-crawler/0.1; +https://crates.io/crates/accessdoc-core)";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_depth: usize,
    pub max_pdfs: usize,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pdfs: 50,
            timeout_secs: 10,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
