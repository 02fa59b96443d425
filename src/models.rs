//! Data models for feed entries and the items flowing through the pipeline.
//!
//! - [`FeedEntry`]: one entry as read from a parsed RSS/Atom document
//! - [`Item`]: a candidate article, enriched stage by stage until it is
//!   published or skipped
//! - [`RunStats`]: counters reported at the end of a run

use chrono::{DateTime, Utc};

use crate::urls::{canonical_url, url_uid};

/// A feed entry after parsing, before any filtering.
///
/// # Fields
///
/// * `title` - Whitespace-normalized entry title (may be empty)
/// * `link` - First link of the entry, as published
/// * `published` - Published date, or the updated date when that is all the feed gives
/// * `body` - Feed-supplied summary or content, with markup stripped
#[derive(Clone, Debug, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub body: Option<String>,
}

/// One article candidate.
///
/// The canonical URL and identity are derived once in [`Item::new`] and
/// cannot be changed afterwards; everything else is filled in as the item
/// moves through extraction and summarization.
#[derive(Clone, Debug)]
pub struct Item {
    raw_url: String,
    canonical_url: String,
    uid: String,
    /// Entry title, `"(no title)"` when the feed gives none.
    pub title: String,
    /// `None` when the feed carried no parseable date.
    pub published: Option<DateTime<Utc>>,
    /// Label of the feed the item came from.
    pub source: String,
    /// Normalized body text supplied by the feed itself.
    pub feed_text: Option<String>,
    /// Article text from the content resolver.
    pub full_text: Option<String>,
    pub bullets: Vec<String>,
    pub tags: Vec<String>,
}

impl Item {
    pub fn new(
        raw_url: &str,
        title: &str,
        published: Option<DateTime<Utc>>,
        source: &str,
        feed_text: Option<String>,
    ) -> Self {
        let canonical = canonical_url(raw_url);
        let uid = url_uid(&canonical);
        let title = if title.trim().is_empty() {
            "(no title)".to_string()
        } else {
            title.to_string()
        };
        Self {
            raw_url: raw_url.to_string(),
            canonical_url: canonical,
            uid,
            title,
            published,
            source: source.to_string(),
            feed_text,
            full_text: None,
            bullets: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Ranking timestamp: undated items count as `now`, i.e. most recent.
    pub fn rank_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.published.unwrap_or(now)
    }
}

/// Counters for the end-of-run report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub feeds_polled: usize,
    pub feeds_not_modified: usize,
    pub feeds_failed: usize,
    pub candidates: usize,
    pub created: usize,
    pub degraded: usize,
    pub skipped_existing: usize,
    pub skipped_uncertain: usize,
    pub failed: usize,
}
