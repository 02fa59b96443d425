//! Turning parsed feed entries into a bounded, newest-first candidate list.
//!
//! Order of operations per feed: drop entries without a link, drop entries
//! older than `now - days_back`, sort newest-first, keep `max_per_feed`.
//! Across feeds, [`merge_feeds`] sorts again and keeps `total_limit`.
//!
//! Entries without a usable date are kept and ranked as `now`, so they sort
//! ahead of every dated entry rather than silently disappearing.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::models::{FeedEntry, Item};

/// Newest-first stable sort; ties keep their input order.
fn sort_newest_first(items: &mut [Item], now: DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(item.rank_time(now)));
}

/// Whether a publish date falls inside the recency window.
///
/// A window reaching past the representable date range has no cutoff.
pub fn within_days(published: Option<DateTime<Utc>>, days: u32, now: DateTime<Utc>) -> bool {
    let cutoff = TimeDelta::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window));
    match (published, cutoff) {
        (Some(dt), Some(cutoff)) => dt >= cutoff,
        _ => true,
    }
}

/// Normalize one feed's entries into at most `max_per_feed` items.
pub fn normalize_feed(
    entries: Vec<FeedEntry>,
    source: &str,
    days_back: u32,
    max_per_feed: usize,
    now: DateTime<Utc>,
) -> Vec<Item> {
    let mut items: Vec<Item> = entries
        .into_iter()
        .filter_map(|entry| {
            let Some(link) = entry.link else {
                debug!(title = %entry.title, "[DROP] no link");
                return None;
            };
            if !within_days(entry.published, days_back, now) {
                debug!(published = ?entry.published, %link, "[DROP] too old");
                return None;
            }
            Some(Item::new(&link, &entry.title, entry.published, source, entry.body))
        })
        .collect();

    sort_newest_first(&mut items, now);
    items.truncate(max_per_feed);
    items
}

/// Combine per-feed lists (in configured feed order) and apply the global cap.
pub fn merge_feeds(per_feed: Vec<Vec<Item>>, total_limit: usize, now: DateTime<Utc>) -> Vec<Item> {
    let mut items: Vec<Item> = per_feed.into_iter().flatten().collect();
    sort_newest_first(&mut items, now);
    items.truncate(total_limit);
    items
}
