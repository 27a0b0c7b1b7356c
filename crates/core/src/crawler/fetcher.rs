use super::CrawlConfig;
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::Duration;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// HTML of the page at `url`.
    async fn fetch_page(&self, url: &str) -> Result<String, CrawlError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|error| CrawlError::Fetch {
                url: String::new(),
                details: format!("http client setup: {error}"),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, CrawlError> {
        let fetch_error = |details: String| CrawlError::Fetch {
            url: url.to_string(),
            details,
        };

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("status {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(fetch_error(format!("skipping non-html content ({content_type})")));
        }

        response
            .text()
            .await
            .map_err(|error| fetch_error(error.to_string()))
    }
}
