//! Article text extraction strategies.
//!
//! Each strategy works on an already-fetched page (or on the feed's own text)
//! and either returns non-empty normalized text or fails with
//! [`AppError::Empty`], letting the [`Chain`](crate::fallback::Chain) move on.

use std::io::Cursor;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::fallback::Strategy;
use crate::utils::normalize_text;

/// Tags whose paragraphs are page chrome rather than article body.
const NOISE_TAGS: [&str; 7] = ["script", "style", "nav", "header", "footer", "form", "aside"];

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// What the extractors get to look at for one item.
#[derive(Clone, Debug, Default)]
pub struct ArticleInput {
    pub url: String,
    /// Page HTML, `None` when robots denied the fetch or it failed.
    pub html: Option<String>,
    pub feed_text: Option<String>,
}

impl ArticleInput {
    fn html(&self, strategy: &str) -> Result<&str> {
        self.html
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| AppError::empty(format!("{strategy}: no page")))
    }
}

fn non_empty(text: String, strategy: &str) -> Result<String> {
    if text.is_empty() {
        Err(AppError::empty(format!("{strategy}: no text")))
    } else {
        Ok(text)
    }
}

/// Main-content extraction with the `readability` crate.
pub struct ReadabilityExtractor;

#[async_trait]
impl Strategy<ArticleInput, String> for ReadabilityExtractor {
    fn name(&self) -> &'static str {
        "readability"
    }

    async fn attempt(&self, input: &ArticleInput) -> Result<String> {
        let html = input.html(self.name())?;
        let url = Url::parse(&input.url)?;
        let mut reader = Cursor::new(html.as_bytes());
        let product = readability::extractor::extract(&mut reader, &url)
            .map_err(|e| AppError::empty(format!("readability: {e}")))?;
        non_empty(normalize_text(&product.text), self.name())
    }
}

/// Every `<p>` outside navigation, forms and other page chrome, joined.
pub struct ParagraphExtractor;

impl ParagraphExtractor {
    pub fn paragraphs(html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&PARAGRAPH)
            .filter(|p| {
                !p.ancestors().any(|node| {
                    node.value()
                        .as_element()
                        .is_some_and(|el| NOISE_TAGS.contains(&el.name()))
                })
            })
            .map(|p| normalize_text(&p.text().collect::<Vec<_>>().join(" ")))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Strategy<ArticleInput, String> for ParagraphExtractor {
    fn name(&self) -> &'static str {
        "paragraphs"
    }

    async fn attempt(&self, input: &ArticleInput) -> Result<String> {
        let html = input.html(self.name())?;
        non_empty(Self::paragraphs(html), self.name())
    }
}

/// The summary or content the feed itself carried.
pub struct FeedTextFallback;

#[async_trait]
impl Strategy<ArticleInput, String> for FeedTextFallback {
    fn name(&self) -> &'static str {
        "feed-text"
    }

    async fn attempt(&self, input: &ArticleInput) -> Result<String> {
        let text = input.feed_text.as_deref().map(normalize_text).unwrap_or_default();
        non_empty(text, self.name())
    }
}
