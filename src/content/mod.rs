//! Full-text resolution for a candidate item.
//!
//! # Submodules
//!
//! - [`robots`]: per-origin robots.txt permission
//! - [`extract`]: readability, paragraph and feed-text strategies
//!
//! The page is fetched at most once, and only when robots allows it. The
//! extraction chain then runs over whatever is available. Resolution never
//! fails: the worst outcome is `None`, and the item goes on without text.

pub mod extract;
pub mod robots;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::fallback::{Chain, Resolved};
use crate::http::{RetryPolicy, send_with_retry};
use crate::models::Item;
use extract::{ArticleInput, FeedTextFallback, ParagraphExtractor, ReadabilityExtractor};
use robots::RobotsPolicy;

/// Source of article HTML.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

pub struct HttpPageSource {
    client: Client,
    retry: RetryPolicy,
}

impl HttpPageSource {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = send_with_retry(self.client.get(url), &self.retry).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::status(format!("page {url}"), status));
        }
        Ok(response.text().await?)
    }
}

pub struct ContentResolver {
    robots: Box<dyn RobotsPolicy>,
    pages: Box<dyn PageSource>,
    chain: Chain<ArticleInput, String>,
}

impl ContentResolver {
    /// Resolver with the standard readability, paragraphs, feed-text order.
    pub fn new(robots: Box<dyn RobotsPolicy>, pages: Box<dyn PageSource>) -> Self {
        let chain = Chain::new()
            .then(ReadabilityExtractor)
            .then(ParagraphExtractor)
            .then(FeedTextFallback);
        Self::with_chain(robots, pages, chain)
    }

    pub fn with_chain(
        robots: Box<dyn RobotsPolicy>,
        pages: Box<dyn PageSource>,
        chain: Chain<ArticleInput, String>,
    ) -> Self {
        Self {
            robots,
            pages,
            chain,
        }
    }

    /// Best available text for `item`, tagged with the strategy that produced it.
    #[instrument(level = "info", skip_all, fields(url = %item.canonical_url()))]
    pub async fn resolve(&self, item: &Item) -> Option<Resolved<String>> {
        let url = item.canonical_url();
        debug!(raw = item.raw_url(), "Resolving article text");
        let html = if self.robots.is_allowed(url).await {
            match self.pages.fetch_html(url).await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!(error = %e, "Page fetch failed; using feed text");
                    None
                }
            }
        } else {
            info!("[ROBOTS] disallowed; using feed text");
            None
        };

        let input = ArticleInput {
            url: url.to_string(),
            html,
            feed_text: item.feed_text.clone(),
        };
        let resolved = self.chain.first_success(&input).await;
        match &resolved {
            Some(r) => info!(strategy = r.strategy, chars = r.value.chars().count(), "Resolved article text"),
            None => warn!("No article text available"),
        }
        resolved
    }
}
