//! One ingestion run, start to finish.
//!
//! ```text
//! feeds ──► candidates ──► text ──► bullets/tags ──► dedup ──► publish
//!   │                                                            │
//!   └── feed cache loaded here ──────────── and saved here ◄─────┘
//! ```
//!
//! Items are processed one at a time in candidate order. Any failure inside an
//! item's processing affects that item only.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::content::ContentResolver;
use crate::feeds::cache::FeedCache;
use crate::feeds::collect_candidates;
use crate::feeds::fetch::FeedSource;
use crate::models::{Item, RunStats};
use crate::publish::{Destination, PublishOutcome, SkipReason, push_item};
use crate::summarize::Enricher;

/// The stage implementations a run uses.
pub struct Pipeline<'a> {
    pub feeds: &'a dyn FeedSource,
    pub resolver: &'a ContentResolver,
    pub enricher: &'a Enricher,
    pub destination: &'a dyn Destination,
}

impl Pipeline<'_> {
    /// Run once: poll, enrich, publish, then persist the feed cache.
    #[instrument(level = "info", skip_all, fields(destination = self.destination.name()))]
    pub async fn run(&self, config: &Config, now: DateTime<Utc>) -> RunStats {
        let mut stats = RunStats::default();
        let mut cache = FeedCache::load(&config.cache_path).await;

        let items = collect_candidates(self.feeds, &mut cache, config, now, &mut stats).await;
        if items.is_empty() {
            warn!("No new items found.");
        }

        for item in items {
            let title = item.title.clone();
            match self.process_item(config, item, now).await {
                PublishOutcome::Created { appended } => {
                    stats.created += 1;
                    if !appended {
                        stats.degraded += 1;
                    }
                }
                PublishOutcome::Skipped(SkipReason::Exists) => {
                    stats.skipped_existing += 1;
                    info!("= SKIP | {title}");
                }
                PublishOutcome::Skipped(SkipReason::Uncertain) => {
                    stats.skipped_uncertain += 1;
                    info!("= SKIP | {title}");
                }
                PublishOutcome::Failed => {
                    stats.failed += 1;
                    error!("! FAIL | {title}");
                }
            }
        }

        debug!(changed = cache.is_dirty(), "Persisting feed cache");
        if let Err(e) = cache.save(&config.cache_path).await {
            error!(path = %config.cache_path.display(), error = %e, "Failed to save feed cache");
        }

        info!(
            feeds_polled = stats.feeds_polled,
            feeds_not_modified = stats.feeds_not_modified,
            feeds_failed = stats.feeds_failed,
            degraded = stats.degraded,
            skipped_existing = stats.skipped_existing,
            skipped_uncertain = stats.skipped_uncertain,
            failed = stats.failed,
            "Done. Added {}/{} items.",
            stats.created,
            stats.candidates
        );
        stats
    }

    async fn process_item(&self, config: &Config, mut item: Item, now: DateTime<Utc>) -> PublishOutcome {
        if config.needs_text() {
            item.full_text = self.resolver.resolve(&item).await.map(|r| r.value);
        }
        if let Some(text) = item.full_text.as_deref() {
            item.bullets = self.enricher.build_bullets(text).await;
            item.tags = self.enricher.build_tags(text).await;
        }

        let outcome = push_item(self.destination, &item, now).await;
        if let PublishOutcome::Created { .. } = outcome {
            info!("+ {} | bullets: {}", item.title, item.bullets.len());
        }
        outcome
    }
}
