//! Conditional feed fetching and RSS/Atom parsing.
//!
//! [`FeedSource`] is the transport seam: [`HttpFeedSource`] issues a GET with
//! `If-None-Match` / `If-Modified-Since` built from the cached tokens and maps
//! the answer to a [`FetchOutcome`]. Parsing is delegated to `feed-rs`; only
//! the fields the pipeline needs are kept.

use async_trait::async_trait;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::feeds::cache::FeedCacheEntry;
use crate::http::{RetryPolicy, send_with_retry};
use crate::models::FeedEntry;
use crate::utils::html_to_text;

/// Result of a conditional GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `304`: nothing new since the cached tokens were issued.
    NotModified { tokens: FeedCacheEntry },
    /// `200`: a new body and the validators that came with it.
    Fresh {
        body: Vec<u8>,
        tokens: FeedCacheEntry,
    },
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, cached: Option<&FeedCacheEntry>) -> Result<FetchOutcome>;
}

pub struct HttpFeedSource {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFeedSource {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, cached: Option<&FeedCacheEntry>) -> Result<FetchOutcome> {
        let mut request = self.client.get(url);
        if let Some(tokens) = cached {
            if let Some(etag) = &tokens.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = &tokens.last_modified {
                request = request.header(IF_MODIFIED_SINCE, modified);
            }
        }

        let response = send_with_retry(request, &self.retry).await?;
        let status = response.status();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let tokens = FeedCacheEntry {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };

        if status == StatusCode::NOT_MODIFIED {
            info!("[FEED] 304 Not Modified (cache)");
            // A bare 304 confirms the tokens we sent.
            let tokens = if tokens.is_empty() {
                cached.cloned().unwrap_or_default()
            } else {
                tokens
            };
            return Ok(FetchOutcome::NotModified { tokens });
        }
        if status != StatusCode::OK {
            return Err(AppError::status(format!("feed {url}"), status));
        }

        let body = response.bytes().await?.to_vec();
        info!(bytes = body.len(), "Fetched feed body");
        Ok(FetchOutcome::Fresh { body, tokens })
    }
}

/// Parse an RSS/Atom document into [`FeedEntry`]s, in document order.
pub fn parse_entries(body: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(body).map_err(AppError::feed)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .map(|t| html_to_text(&t.content))
                .unwrap_or_default();
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|l| !l.is_empty());
            let body = entry
                .summary
                .map(|t| t.content)
                .or(entry.content.and_then(|c| c.body))
                .map(|b| html_to_text(&b))
                .filter(|b| !b.is_empty());
            FeedEntry {
                title,
                link,
                published: entry.published.or(entry.updated),
                body,
            }
        })
        .collect();
    Ok(entries)
}
