use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};
use url::Url;

use super::fetcher::PageFetcher;
use super::parser::{extract_links, is_pdf_candidate, normalize_url, pdf_name, same_domain};
use super::CrawlConfig;
use crate::models::PdfLink;
use crate::CrawlError;

pub struct PdfCrawler<'a, F: PageFetcher + ?Sized> {
    config: CrawlConfig,
    fetcher: &'a F,
    visited: HashSet<String>,
    queued: HashSet<String>,
    queue: VecDeque<(Url, usize)>,
    seen_pdfs: HashSet<String>,
}

impl<'a, F: PageFetcher + ?Sized> PdfCrawler<'a, F> {
    pub fn new(config: CrawlConfig, fetcher: &'a F) -> Self {
        Self {
            config,
            fetcher,
            visited: HashSet::new(),
            queued: HashSet::new(),
            queue: VecDeque::new(),
            seen_pdfs: HashSet::new(),
        }
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    /// PDF links reachable from `seed`, in discovery order.
    pub async fn crawl(&mut self, seed: &str) -> Result<Vec<PdfLink>, CrawlError> {
        let seed_url = Url::parse(seed.trim())
            .map_err(|error| CrawlError::InvalidUrl(format!("{seed}: {error}")))?;
        if seed_url.scheme() != "http" && seed_url.scheme() != "https" {
            return Err(CrawlError::InvalidUrl(format!(
                "unsupported scheme {} (only http/https)",
                seed_url.scheme()
            )));
        }

        info!(
            seed = %seed_url,
            max_depth = self.config.max_depth,
            max_pdfs = self.config.max_pdfs,
            "starting pdf crawl"
        );

        let mut pdfs = Vec::new();
        self.queued.insert(normalize_url(&seed_url));
        self.queue.push_back((seed_url.clone(), 0));

        while let Some((page, depth)) = self.queue.pop_front() {
            if pdfs.len() >= self.config.max_pdfs {
                break;
            }

            let key = normalize_url(&page);
            if self.visited.contains(&key) || depth > self.config.max_depth {
                debug!(url = %key, depth, "skipped");
                continue;
            }
            self.visited.insert(key.clone());

            let html = match self.fetcher.fetch_page(&key).await {
                Ok(html) => html,
                Err(error) => {
                    warn!(url = %key, %error, "page unavailable, treated as empty");
                    continue;
                }
            };

            let links = match extract_links(&html, &page) {
                Ok(links) => links,
                Err(error) => {
                    warn!(url = %key, %error, "could not parse page");
                    continue;
                }
            };

            for link in links {
                if !same_domain(&link, &seed_url) {
                    continue;
                }

                let normalized = normalize_url(&link);
                if is_pdf_candidate(&link) {
                    if pdfs.len() < self.config.max_pdfs && self.seen_pdfs.insert(normalized.clone()) {
                        let name = pdf_name(&link);
                        debug!(url = %normalized, %name, depth, "pdf found");
                        pdfs.push(PdfLink {
                            url: normalized,
                            name,
                        });
                    }
                    continue;
                }

                if !self.visited.contains(&normalized) && self.queued.insert(normalized) {
                    self.queue.push_back((link, depth + 1));
                }
            }
        }

        info!(
            pdfs = pdfs.len(),
            pages = self.visited.len(),
            "pdf crawl complete"
        );
        Ok(pdfs)
    }
}
