//! # AI News Agent
//!
//! An RSS/Atom ingestion pipeline that polls AI news feeds, pulls the article
//! text where robots.txt allows it, writes short bullet summaries and tags,
//! and publishes new items to a Notion database exactly once.
//!
//! ## Features
//!
//! - Conditional feed fetching (ETag / Last-Modified) with an on-disk cache
//! - Recency window, per-feed and global caps, newest-first ordering
//! - Article text via readability, then page paragraphs, then the feed's own text
//! - Bullets and tags from Gemini, with local heuristics as the fallback
//! - Deduplication by canonical URL and UID; uncertain lookups are skipped
//!
//! ## Usage
//!
//! ```sh
//! NOTION_TOKEN=... NOTION_DATABASE_ID=... ai_news_agent
//! ai_news_agent --dry-run --feed "AI News=https://artificialintelligence-news.com/feed/"
//! ```
//!
//! ## Architecture
//!
//! 1. **Polling**: conditional GET per feed, parse, filter, cap
//! 2. **Resolving**: robots check, one page fetch, extraction chain
//! 3. **Enriching**: bullet and tag chains over the resolved text
//! 4. **Publishing**: dedup lookup, create, append bullets

use std::error::Error;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod content;
mod error;
mod fallback;
mod feeds;
mod http;
mod models;
mod pipeline;
mod publish;
mod summarize;
mod urls;
mod utils;

use api::{GeminiAsk, RetryAsk};
use cli::Cli;
use config::{AGENT_NAME, Config};
use content::robots::HttpRobots;
use content::{ContentResolver, HttpPageSource};
use feeds::fetch::HttpFeedSource;
use pipeline::Pipeline;
use publish::Destination;
use publish::dry_run::LogDestination;
use publish::notion::NotionDestination;
use summarize::{Enricher, GeminiClient, Generative};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "ai_news_agent starting up");

    let args = Cli::parse();
    debug!(feeds = args.feeds.len(), dry_run = args.dry_run, "Parsed CLI arguments");
    let config = Config::from_cli(args)?;

    let client = http::build_client(config.http_timeout)?;

    let feed_source = HttpFeedSource::new(client.clone(), config.retry);
    let resolver = ContentResolver::new(
        Box::new(HttpRobots::new(client.clone(), config.retry, AGENT_NAME)),
        Box::new(HttpPageSource::new(client.clone(), config.retry)),
    );

    let generative: Option<Arc<dyn Generative>> = config.gemini.as_ref().map(|g| {
        let api = RetryAsk::new(GeminiAsk::new(client.clone(), g), config.retry);
        Arc::new(GeminiClient::new(api)) as Arc<dyn Generative>
    });
    let enricher = Enricher::from_config(&config, generative);

    let destination: Box<dyn Destination> = match &config.notion {
        Some(notion) => Box::new(NotionDestination::new(client.clone(), config.retry, notion)?),
        None => {
            info!("Dry run: nothing will be written to Notion");
            Box::new(LogDestination::new())
        }
    };

    let pipeline = Pipeline {
        feeds: &feed_source,
        resolver: &resolver,
        enricher: &enricher,
        destination: destination.as_ref(),
    };
    let stats = pipeline.run(&config, Utc::now()).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        created = stats.created,
        candidates = stats.candidates,
        "ai_news_agent finished"
    );

    Ok(())
}
