//! Immutable run configuration.
//!
//! Built once from [`Cli`] in `main` and passed by reference to every stage.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::cli::{Cli, SummarizerKind};
use crate::error::{AppError, Result};
use crate::http::RetryPolicy;

pub const AGENT_NAME: &str = "AI-News-Agent";
pub const AGENT_VERSION: &str = "1.2";
pub const AGENT_URL: &str = "https://github.com/moniburnejko/ai-news-agent";

pub const DEFAULT_FEED_NAME: &str = "AI News";
pub const DEFAULT_FEED_URL: &str = "https://artificialintelligence-news.com/feed/";

/// `AI-News-Agent/1.2 (+https://github.com/moniburnejko/ai-news-agent)`
pub fn user_agent() -> String {
    format!("{AGENT_NAME}/{AGENT_VERSION} (+{AGENT_URL})")
}

/// One feed to poll and the source label its items carry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub version: String,
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub feeds: Vec<FeedSpec>,
    pub days_back: u32,
    pub max_per_feed: usize,
    pub total_limit: usize,
    pub enable_summary: bool,
    pub summary_bullets: usize,
    pub summary_max_chars: usize,
    pub tags_enabled: bool,
    pub tags_max: usize,
    pub local_tags: bool,
    pub summarizer: SummarizerKind,
    /// Present only when the generative path is both selected and configured.
    pub gemini: Option<GeminiConfig>,
    /// `None` in dry-run mode.
    pub notion: Option<NotionConfig>,
    pub cache_path: PathBuf,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub feed_delay: Duration,
    pub dry_run: bool,
}

impl Config {
    /// Validate the parsed arguments and resolve the feed list.
    #[instrument(level = "info", skip_all)]
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.max_per_feed == 0 || cli.total_limit == 0 {
            return Err(AppError::config("MAX_PER_FEED and TOTAL_LIMIT must be at least 1"));
        }

        let mut feeds: Vec<FeedSpec> = cli
            .feeds
            .into_iter()
            .map(|f| FeedSpec {
                name: f.name.unwrap_or_else(|| label_from_url(&f.url)),
                url: f.url,
            })
            .collect();
        if let Some(path) = &cli.feeds_file {
            let yaml = std::fs::read_to_string(path)?;
            feeds.extend(parse_feeds_yaml(&yaml)?);
        }
        if feeds.is_empty() {
            feeds.push(FeedSpec {
                name: DEFAULT_FEED_NAME.to_string(),
                url: DEFAULT_FEED_URL.to_string(),
            });
        }

        let gemini = match (cli.summarizer, non_empty(cli.google_api_key)) {
            (SummarizerKind::Google, Some(api_key)) => Some(GeminiConfig {
                api_key,
                model: cli.gemini_model,
            }),
            _ => None,
        };

        let notion = if cli.dry_run {
            None
        } else {
            match (non_empty(cli.notion_token), non_empty(cli.notion_database_id)) {
                (Some(token), Some(database_id)) => Some(NotionConfig {
                    token,
                    database_id,
                    version: cli.notion_version,
                }),
                _ => {
                    return Err(AppError::config(
                        "Missing NOTION_TOKEN or NOTION_DATABASE_ID (use --dry-run to skip Notion)",
                    ));
                }
            }
        };

        let config = Self {
            feeds,
            days_back: cli.days_back,
            max_per_feed: cli.max_per_feed,
            total_limit: cli.total_limit,
            enable_summary: cli.enable_summary,
            summary_bullets: cli.summary_bullets,
            summary_max_chars: cli.summary_max_chars,
            tags_enabled: cli.tags_enabled,
            tags_max: cli.tags_max,
            local_tags: cli.local_tags,
            summarizer: cli.summarizer,
            gemini,
            notion,
            cache_path: PathBuf::from(cli.cache_path),
            http_timeout: Duration::from_secs(cli.http_timeout_secs),
            retry: RetryPolicy::new(cli.http_retries, Duration::from_millis(600)),
            feed_delay: Duration::from_millis(cli.feed_delay_ms),
            dry_run: cli.dry_run,
        };
        info!(
            feeds = config.feeds.len(),
            days_back = config.days_back,
            max_per_feed = config.max_per_feed,
            total_limit = config.total_limit,
            generative = config.gemini.is_some(),
            dry_run = config.dry_run,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Whether article text is needed at all for this run.
    pub fn needs_text(&self) -> bool {
        self.enable_summary || self.tags_enabled
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Use the feed host as a label when none was given.
fn label_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}

fn parse_feeds_yaml(yaml: &str) -> Result<Vec<FeedSpec>> {
    Ok(serde_yaml::from_str(yaml)?)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        feeds: vec![FeedSpec {
            name: DEFAULT_FEED_NAME.to_string(),
            url: DEFAULT_FEED_URL.to_string(),
        }],
        days_back: 3,
        max_per_feed: 10,
        total_limit: 50,
        enable_summary: true,
        summary_bullets: 5,
        summary_max_chars: 6000,
        tags_enabled: true,
        tags_max: 4,
        local_tags: false,
        summarizer: SummarizerKind::Google,
        gemini: None,
        notion: None,
        cache_path: PathBuf::from(".cache/feeds.json"),
        http_timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(0, Duration::ZERO),
        feed_delay: Duration::ZERO,
        dry_run: true,
    }
}
