//! Command-line interface definitions for the AI news agent.
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file in the working directory is loaded first). The parsed [`Cli`] is turned
//! into an immutable [`crate::config::Config`] once at startup; nothing else
//! reads the environment.

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};

/// Which generative backend produces bullets and tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SummarizerKind {
    /// Google Gemini, falling back to local heuristics.
    Google,
    /// Local heuristics only.
    Local,
}

/// A feed to poll, given as `NAME=URL` (or a bare URL).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedArg {
    pub name: Option<String>,
    pub url: String,
}

fn parse_feed_arg(s: &str) -> Result<FeedArg, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("feed must not be empty".to_string());
    }
    // A bare URL contains "://" before any '='.
    match s.split_once('=') {
        Some((name, url)) if !name.contains("://") => {
            let url = url.trim();
            if url.is_empty() {
                return Err(format!("feed '{s}' has no URL"));
            }
            Ok(FeedArg {
                name: Some(name.trim().to_string()),
                url: url.to_string(),
            })
        }
        _ => Ok(FeedArg {
            name: None,
            url: s.to_string(),
        }),
    }
}

/// Command-line arguments for the AI news agent.
///
/// # Examples
///
/// ```sh
/// # Default feed, publish to Notion
/// NOTION_TOKEN=... NOTION_DATABASE_ID=... ai_news_agent
///
/// # Two feeds, local summaries only, nothing written
/// ai_news_agent --feed "MIT=https://news.mit.edu/rss/topic/artificial-intelligence2" \
///     --feed "AI News=https://artificialintelligence-news.com/feed/" \
///     --summarizer local --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Feed to poll as NAME=URL; repeat for several feeds
    #[arg(long = "feed", env = "FEEDS", value_delimiter = ',', value_parser = parse_feed_arg)]
    pub feeds: Vec<FeedArg>,

    /// YAML file listing feeds as `- {name: ..., url: ...}`
    #[arg(long, env = "FEEDS_FILE")]
    pub feeds_file: Option<String>,

    /// Drop entries published more than this many days ago
    #[arg(long, env = "DAYS_BACK", default_value_t = 3)]
    pub days_back: u32,

    /// Keep at most this many entries per feed
    #[arg(long, env = "MAX_PER_FEED", default_value_t = 10)]
    pub max_per_feed: usize,

    /// Keep at most this many entries across all feeds
    #[arg(long, env = "TOTAL_LIMIT", default_value_t = 50)]
    pub total_limit: usize,

    /// Produce bullet summaries
    #[arg(long, env = "ENABLE_SUMMARY", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub enable_summary: bool,

    /// Number of bullets per article
    #[arg(long, env = "SUMMARY_BULLETS", default_value_t = 5)]
    pub summary_bullets: usize,

    /// Article text is cut to this many characters before summarizing
    #[arg(long, env = "SUMMARY_MAX_CHARS", default_value_t = 6000)]
    pub summary_max_chars: usize,

    /// Produce topical tags
    #[arg(long, env = "TAGS_ENABLED", default_value_t = true, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub tags_enabled: bool,

    /// Number of tags per article
    #[arg(long, env = "TAGS_MAX", default_value_t = 4)]
    pub tags_max: usize,

    /// Derive tags from keyword frequency when the generative service is unavailable
    #[arg(long, env = "LOCAL_TAGS", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub local_tags: bool,

    /// Summarizer backend
    #[arg(long, env = "SUMMARIZER", value_enum, ignore_case = true, default_value_t = SummarizerKind::Google)]
    pub summarizer: SummarizerKind,

    /// Google API key for Gemini
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,

    /// Notion integration token
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    pub notion_token: Option<String>,

    /// Notion database receiving the pages
    #[arg(long, env = "NOTION_DATABASE_ID")]
    pub notion_database_id: Option<String>,

    /// Notion API version header
    #[arg(long, env = "NOTION_VERSION", default_value = "2022-06-28")]
    pub notion_version: String,

    /// Where ETag/Last-Modified tokens are kept between runs
    #[arg(long, env = "CACHE_PATH", default_value = ".cache/feeds.json")]
    pub cache_path: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 20)]
    pub http_timeout_secs: u64,

    /// Retries for transient HTTP failures (429 and 5xx)
    #[arg(long, env = "HTTP_RETRIES", default_value_t = 3)]
    pub http_retries: usize,

    /// Pause between two feed fetches, in milliseconds
    #[arg(long, env = "FEED_DELAY_MS", default_value_t = 1000)]
    pub feed_delay_ms: u64,

    /// Log the records instead of writing them to Notion
    #[arg(long, env = "DRY_RUN", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: bool,
}

/// Parse `args` with every `env` binding removed, so the host environment
/// cannot leak into the result.
#[cfg(test)]
pub(crate) fn parse_args(args: &[&str]) -> Cli {
    use clap::{CommandFactory, FromArgMatches};

    let matches = Cli::command()
        .mut_args(|arg| arg.env(None::<&'static str>))
        .try_get_matches_from(args.iter().copied())
        .unwrap();
    Cli::from_arg_matches(&matches).unwrap()
}
