//! A destination that writes nothing and logs what it would have written.
//!
//! Nothing is ever found to exist beyond what this run already "created", so a
//! dry run shows every item that would be published.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::publish::{Destination, PageRecord};

#[derive(Default)]
pub struct LogDestination {
    seen: Mutex<HashSet<String>>,
}

impl LogDestination {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Destination for LogDestination {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn exists(&self, uid: &str, url: &str) -> Result<bool> {
        let seen = self.seen.lock().map(|s| s.contains(uid) || s.contains(url));
        Ok(seen.unwrap_or(false))
    }

    async fn create(&self, record: &PageRecord) -> Result<String> {
        info!(
            title = %record.title,
            url = %record.url,
            uid = %record.uid,
            published = %record.published.to_rfc3339(),
            source = %record.source,
            tags = ?record.tags,
            "[DRY RUN] would create record"
        );
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(record.uid.clone());
            seen.insert(record.url.clone());
        }
        Ok(format!("dry-run-{}", record.uid))
    }

    async fn append(&self, record_id: &str, bullets: &[String]) -> Result<()> {
        for bullet in bullets {
            info!(%record_id, %bullet, "[DRY RUN] would append bullet");
        }
        Ok(())
    }

    fn max_append_batch(&self) -> usize {
        usize::MAX
    }
}
