//! Conditional-fetch token cache.
//!
//! Keeps the last `ETag` / `Last-Modified` pair seen for each feed URL so the
//! next run can ask the server for changes only. The file is read once at
//! startup and rewritten atomically once at the end of the run:
//!
//! ```json
//! {
//!   "https://artificialintelligence-news.com/feed/": {
//!     "etag": "\"abc123\"",
//!     "modified": "Wed, 15 Oct 2025 08:00:00 GMT"
//!   }
//! }
//! ```
//!
//! A missing or corrupt file only costs one unconditional refetch, so load
//! errors are logged and treated as an empty cache.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::error::Result;

/// Validator tokens for one feed. Both are opaque strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "modified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl FeedCacheEntry {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedCache {
    entries: BTreeMap<String, FeedCacheEntry>,
    dirty: bool,
}

impl FeedCache {
    /// Read the cache file; any failure yields an empty cache.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No feed cache yet; fetching unconditionally");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read feed cache; ignoring it");
                return Self::default();
            }
        };
        match serde_json::from_slice::<BTreeMap<String, FeedCacheEntry>>(&bytes) {
            Ok(entries) => {
                info!(feeds = entries.len(), "Loaded feed cache");
                Self {
                    entries,
                    dirty: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Feed cache is corrupt; ignoring it");
                Self::default()
            }
        }
    }

    /// Tokens stored for `feed_url`, if any.
    pub fn tokens(&self, feed_url: &str) -> Option<&FeedCacheEntry> {
        self.entries.get(feed_url)
    }

    /// Replace the entry for `feed_url`.
    pub fn record(&mut self, feed_url: &str, entry: FeedCacheEntry) {
        if self.entries.get(feed_url) != Some(&entry) {
            self.dirty = true;
        }
        self.entries.insert(feed_url.to_string(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the cache atomically (temp file, then rename).
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&self.entries)?;

        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;

        self.dirty = false;
        info!(feeds = self.entries.len(), "Saved feed cache");
        Ok(())
    }
}
