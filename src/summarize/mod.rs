//! Bullet summaries and tags.
//!
//! Both outputs come from a [`Chain`]: the generative model first (when one is
//! configured), then a local heuristic. Neither path can fail the pipeline;
//! the worst result is an empty list.
//!
//! # Submodules
//!
//! - [`local`]: lead-sentence bullets and keyword-frequency tags

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::api::{AskAsync, GeminiAsk, RetryAsk, ask_with_backoff};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fallback::{Chain, Strategy};
use crate::utils::{normalize_text, truncate_chars};

static BULLET_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*\d\.\)\s]+").unwrap());
static TAG_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[#\-\*\d\.\)\s]+").unwrap());
static TAG_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\n]").unwrap());

/// Longest tag kept, in words.
const MAX_TAG_WORDS: usize = 3;

/// A generative model able to summarize and tag article text.
#[async_trait]
pub trait Generative: Send + Sync {
    async fn summarize(&self, text: &str, k: usize) -> Result<Vec<String>>;
    async fn extract_tags(&self, text: &str, n: usize) -> Result<Vec<String>>;
}

fn bullets_prompt(text: &str, k: usize) -> String {
    format!(
        "Summarize this article into exactly {k} concise bullet points. \
         Each bullet should be a full sentence (max 30 words), no emojis, no markdown.\n\n\
         Article:\n{text}"
    )
}

fn tags_prompt(text: &str, n: usize) -> String {
    format!(
        "Extract topical keywords from the article. \
         Return EXACTLY {n} short tags, lowercased, no hashtags, no emojis. \
         Prefer domain terms (e.g., 'diffusion models', 'rag', 'inference'). \
         Output as comma-separated list only.\n\n\
         Article:\n{text}"
    )
}

/// One bullet per non-empty line, list markers removed.
pub fn parse_bullets(raw: &str, k: usize) -> Vec<String> {
    raw.lines()
        .map(normalize_text)
        .map(|line| BULLET_MARKER.replace(&line, "").into_owned())
        .filter(|line| !line.is_empty())
        .take(k)
        .collect()
}

/// Comma or newline separated tags: lowercased, unique, at most three words each.
pub fn parse_tags(raw: &str, n: usize) -> Vec<String> {
    TAG_SPLIT
        .split(raw)
        .map(normalize_text)
        .map(|part| TAG_MARKER.replace(&part, "").trim().to_lowercase())
        .filter(|tag| !tag.is_empty() && tag.split_whitespace().count() <= MAX_TAG_WORDS)
        .unique()
        .take(n)
        .collect()
}

/// Gemini behind the retrying [`AskAsync`] stack.
pub struct GeminiClient {
    api: RetryAsk<GeminiAsk>,
}

impl GeminiClient {
    pub fn new(api: RetryAsk<GeminiAsk>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Generative for GeminiClient {
    async fn summarize(&self, text: &str, k: usize) -> Result<Vec<String>> {
        let raw = ask_with_backoff(&self.api, &bullets_prompt(text, k)).await?;
        Ok(parse_bullets(&raw, k))
    }

    async fn extract_tags(&self, text: &str, n: usize) -> Result<Vec<String>> {
        let raw = ask_with_backoff(&self.api, &tags_prompt(text, n)).await?;
        Ok(parse_tags(&raw, n))
    }
}

/// Text plus how many bullets or tags are wanted.
#[derive(Clone, Debug)]
pub struct TextRequest {
    pub text: String,
    pub count: usize,
}

fn non_empty(values: Vec<String>, what: &str) -> Result<Vec<String>> {
    if values.is_empty() {
        Err(AppError::empty(what))
    } else {
        Ok(values)
    }
}

pub struct GenerativeBullets(pub Arc<dyn Generative>);

#[async_trait]
impl Strategy<TextRequest, Vec<String>> for GenerativeBullets {
    fn name(&self) -> &'static str {
        "gemini-bullets"
    }

    async fn attempt(&self, input: &TextRequest) -> Result<Vec<String>> {
        let mut bullets = self.0.summarize(&input.text, input.count).await?;
        bullets.truncate(input.count);
        non_empty(bullets, self.name())
    }
}

pub struct LocalBullets;

#[async_trait]
impl Strategy<TextRequest, Vec<String>> for LocalBullets {
    fn name(&self) -> &'static str {
        "local-sentences"
    }

    async fn attempt(&self, input: &TextRequest) -> Result<Vec<String>> {
        non_empty(local::fallback_bullets(&input.text, input.count), self.name())
    }
}

pub struct GenerativeTags(pub Arc<dyn Generative>);

#[async_trait]
impl Strategy<TextRequest, Vec<String>> for GenerativeTags {
    fn name(&self) -> &'static str {
        "gemini-tags"
    }

    async fn attempt(&self, input: &TextRequest) -> Result<Vec<String>> {
        let tags = self.0.extract_tags(&input.text, input.count).await?;
        // Re-apply the tag rules whatever the backend returned.
        let tags = parse_tags(&tags.join(","), input.count);
        non_empty(tags, self.name())
    }
}

pub struct LocalTags;

#[async_trait]
impl Strategy<TextRequest, Vec<String>> for LocalTags {
    fn name(&self) -> &'static str {
        "keyword-frequency"
    }

    async fn attempt(&self, input: &TextRequest) -> Result<Vec<String>> {
        non_empty(local::keyword_tags(&input.text, input.count), self.name())
    }
}

/// Builds bullets and tags for article text.
pub struct Enricher {
    bullets: Chain<TextRequest, Vec<String>>,
    tags: Chain<TextRequest, Vec<String>>,
    enable_summary: bool,
    summary_bullets: usize,
    tags_enabled: bool,
    tags_max: usize,
    max_chars: usize,
}

impl Enricher {
    /// `generative` is used only when given; `Config` decides whether it is.
    pub fn from_config(config: &Config, generative: Option<Arc<dyn Generative>>) -> Self {
        let mut bullets = Chain::new();
        let mut tags = Chain::new();
        if let Some(g) = generative {
            bullets = bullets.then(GenerativeBullets(Arc::clone(&g)));
            tags = tags.then(GenerativeTags(g));
        }
        bullets = bullets.then(LocalBullets);
        if config.local_tags {
            tags = tags.then(LocalTags);
        }
        info!(
            summarizer = ?config.summarizer,
            bullets = ?bullets.names(),
            tags = ?tags.names(),
            "Summarization chains ready"
        );
        Self {
            bullets,
            tags,
            enable_summary: config.enable_summary,
            summary_bullets: config.summary_bullets,
            tags_enabled: config.tags_enabled,
            tags_max: config.tags_max,
            max_chars: config.summary_max_chars,
        }
    }

    fn request(&self, text: &str, count: usize) -> Option<TextRequest> {
        let text = truncate_chars(text.trim(), self.max_chars);
        if text.is_empty() || count == 0 {
            return None;
        }
        Some(TextRequest {
            text: text.to_string(),
            count,
        })
    }

    /// Up to `SUMMARY_BULLETS` bullets; empty when disabled or nothing worked.
    pub async fn build_bullets(&self, text: &str) -> Vec<String> {
        if !self.enable_summary {
            return Vec::new();
        }
        let Some(request) = self.request(text, self.summary_bullets) else {
            return Vec::new();
        };
        match self.bullets.first_success(&request).await {
            Some(resolved) => {
                debug!(strategy = resolved.strategy, count = resolved.value.len(), "bullets built");
                resolved.value
            }
            None => Vec::new(),
        }
    }

    /// Up to `TAGS_MAX` lowercase unique tags; empty when disabled or nothing worked.
    pub async fn build_tags(&self, text: &str) -> Vec<String> {
        if !self.tags_enabled || self.tags.is_empty() {
            return Vec::new();
        }
        let Some(request) = self.request(text, self.tags_max) else {
            return Vec::new();
        };
        match self.tags.first_success(&request).await {
            Some(resolved) => {
                debug!(strategy = resolved.strategy, count = resolved.value.len(), "tags built");
                resolved.value
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted generative backend that records the text it was given.
    #[derive(Default)]
    pub struct FakeGenerative {
        pub bullets: Option<Vec<String>>,
        pub tags: Option<Vec<String>>,
        pub seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generative for FakeGenerative {
        async fn summarize(&self, text: &str, _k: usize) -> Result<Vec<String>> {
            self.seen.lock().unwrap().push(text.to_string());
            self.bullets
                .clone()
                .ok_or_else(|| AppError::generative("unavailable"))
        }

        async fn extract_tags(&self, text: &str, _n: usize) -> Result<Vec<String>> {
            self.seen.lock().unwrap().push(text.to_string());
            self.tags
                .clone()
                .ok_or_else(|| AppError::generative("unavailable"))
        }
    }
}
