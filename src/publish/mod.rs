//! Deduplicated publishing to a record store.
//!
//! # Submodules
//!
//! - [`notion`]: the Notion database destination
//! - [`dry_run`]: a destination that only logs
//!
//! For each item the destination is first asked whether a record with the
//! same UID or canonical URL exists. Only a definite "no" leads to a create;
//! an answer we cannot trust is treated like "yes". Bullets are appended
//! after the record exists, in batches the destination accepts.

pub mod dry_run;
pub mod notion;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::models::Item;

/// The fields written when a record is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRecord {
    pub title: String,
    pub url: String,
    pub uid: String,
    /// The item's date, or the run's `now` for undated items.
    pub published: DateTime<Utc>,
    pub source: String,
    pub tags: Vec<String>,
}

impl PageRecord {
    pub fn from_item(item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            title: item.title.clone(),
            url: item.canonical_url().to_string(),
            uid: item.uid().to_string(),
            published: item.published.unwrap_or(now),
            source: item.source.clone(),
            tags: item.tags.clone(),
        }
    }
}

#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a record matching `uid` OR `url` exists.
    async fn exists(&self, uid: &str, url: &str) -> Result<bool>;

    /// Create a record and return its id.
    async fn create(&self, record: &PageRecord) -> Result<String>;

    /// Append bullets to a record; `bullets.len()` never exceeds [`Self::max_append_batch`].
    async fn append(&self, record_id: &str, bullets: &[String]) -> Result<()>;

    fn max_append_batch(&self) -> usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupDecision {
    Exists,
    Absent,
    /// The lookup failed; nobody knows.
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Exists,
    Uncertain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// `appended` is false when the record exists but some bullets are missing.
    Created { appended: bool },
    Skipped(SkipReason),
    Failed,
}

pub async fn dedup_decision(dest: &dyn Destination, uid: &str, url: &str) -> DedupDecision {
    match dest.exists(uid, url).await {
        Ok(true) => DedupDecision::Exists,
        Ok(false) => DedupDecision::Absent,
        Err(e) => {
            warn!(%url, error = %e, "Dedup lookup failed");
            DedupDecision::Unknown
        }
    }
}

/// Publish one item unless it is, or might be, already there.
#[instrument(level = "info", skip_all, fields(destination = dest.name(), uid = %item.uid()))]
pub async fn push_item(dest: &dyn Destination, item: &Item, now: DateTime<Utc>) -> PublishOutcome {
    match dedup_decision(dest, item.uid(), item.canonical_url()).await {
        DedupDecision::Exists => return PublishOutcome::Skipped(SkipReason::Exists),
        DedupDecision::Unknown => {
            warn!(url = %item.canonical_url(), "Skipping push due to query uncertainty");
            return PublishOutcome::Skipped(SkipReason::Uncertain);
        }
        DedupDecision::Absent => {}
    }

    let record = PageRecord::from_item(item, now);
    let record_id = match dest.create(&record).await {
        Ok(id) => id,
        Err(e) => {
            error!(url = %record.url, error = %e, "Failed to create record");
            return PublishOutcome::Failed;
        }
    };
    info!(%record_id, "Created record");

    let batch = dest.max_append_batch().max(1);
    let mut appended = true;
    for chunk in item.bullets.chunks(batch) {
        if let Err(e) = dest.append(&record_id, chunk).await {
            warn!(%record_id, error = %e, "Failed to append bullets; record left without them");
            appended = false;
            break;
        }
    }
    PublishOutcome::Created { appended }
}
