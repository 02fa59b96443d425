//! Feed polling: conditional fetch, parsing, and normalization.
//!
//! # Submodules
//!
//! - [`cache`]: ETag / Last-Modified tokens persisted between runs
//! - [`fetch`]: conditional GET and RSS/Atom parsing
//! - [`normalize`]: recency filter, per-feed and global caps, ordering
//!
//! Feeds are fetched one at a time. A feed that fails (transport error, bad
//! status, unparseable body) contributes no items and keeps its old cache
//! entry; the run carries on with the next feed.

pub mod cache;
pub mod fetch;
pub mod normalize;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info, instrument};

use crate::config::{Config, FeedSpec};
use crate::error::Result;
use crate::models::{Item, RunStats};
use cache::FeedCache;
use fetch::{FeedSource, FetchOutcome, parse_entries};
use normalize::{merge_feeds, normalize_feed};

/// Fetch and normalize a single feed, updating `cache` on success.
///
/// `304 Not Modified` is a success with zero items.
#[instrument(level = "info", skip_all, fields(feed = %feed.name, url = %feed.url))]
pub async fn poll_feed(
    source: &dyn FeedSource,
    cache: &mut FeedCache,
    feed: &FeedSpec,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Option<Vec<Item>>> {
    match source.fetch(&feed.url, cache.tokens(&feed.url)).await? {
        FetchOutcome::NotModified { tokens } => {
            cache.record(&feed.url, tokens);
            Ok(None)
        }
        FetchOutcome::Fresh { body, tokens } => {
            let entries = parse_entries(&body)?;
            info!(entries = entries.len(), "[FEED] received entries");
            // Only remember validators for a body we could actually read.
            cache.record(&feed.url, tokens);
            let items = normalize_feed(entries, &feed.name, config.days_back, config.max_per_feed, now);
            info!(kept = items.len(), "[FEED] kept");
            Ok(Some(items))
        }
    }
}

/// Poll every configured feed and return the merged candidate list.
pub async fn collect_candidates(
    source: &dyn FeedSource,
    cache: &mut FeedCache,
    config: &Config,
    now: DateTime<Utc>,
    stats: &mut RunStats,
) -> Vec<Item> {
    let mut per_feed = Vec::with_capacity(config.feeds.len());
    for (i, feed) in config.feeds.iter().enumerate() {
        if i > 0 && !config.feed_delay.is_zero() {
            sleep(config.feed_delay).await;
        }
        stats.feeds_polled += 1;
        match poll_feed(source, cache, feed, config, now).await {
            Ok(Some(items)) => per_feed.push(items),
            Ok(None) => stats.feeds_not_modified += 1,
            Err(e) => {
                stats.feeds_failed += 1;
                error!(feed = %feed.name, url = %feed.url, error = %e, "[FEED] fetch failed");
            }
        }
    }

    let items = merge_feeds(per_feed, config.total_limit, now);
    stats.candidates = items.len();
    info!(candidates = items.len(), "Collected candidate items");
    items
}

#[cfg(test)]
pub(crate) mod testing {
    use super::cache::FeedCacheEntry;
    use super::fetch::{FeedSource, FetchOutcome};
    use crate::error::{AppError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves a fixed body per URL and honours `If-None-Match` like a real server.
    #[derive(Default)]
    pub struct FakeFeedSource {
        pub bodies: HashMap<String, (String, String)>,
        pub requests: Mutex<Vec<(String, Option<FeedCacheEntry>)>>,
    }

    impl FakeFeedSource {
        pub fn with_feed(mut self, url: &str, etag: &str, body: &str) -> Self {
            self.bodies
                .insert(url.to_string(), (etag.to_string(), body.to_string()));
            self
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeedSource {
        async fn fetch(&self, url: &str, cached: Option<&FeedCacheEntry>) -> Result<FetchOutcome> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), cached.cloned()));
            let Some((etag, body)) = self.bodies.get(url) else {
                return Err(AppError::Status {
                    context: format!("feed {url}"),
                    status: 404,
                });
            };
            let tokens = FeedCacheEntry {
                etag: Some(etag.clone()),
                last_modified: None,
            };
            if cached.and_then(|c| c.etag.as_ref()) == Some(etag) {
                return Ok(FetchOutcome::NotModified { tokens });
            }
            Ok(FetchOutcome::Fresh {
                body: body.clone().into_bytes(),
                tokens,
            })
        }
    }
}
