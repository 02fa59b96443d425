//! Generative-model API interaction with exponential backoff retry logic.
//!
//! This module talks to the Gemini `generateContent` REST endpoint. Prompts go
//! in as plain text and the first candidate's text comes back.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining one prompt/answer exchange
//! - [`GeminiAsk`]: a single `generateContent` call over `reqwest`
//! - [`RetryAsk`]: decorator that retries transient failures of any [`AskAsync`]
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (transport errors, `429`, `5xx`);
//!   a rejected key or a malformed answer fails immediately
//! - Exponential backoff per [`RetryPolicy`], capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use std::fmt;
use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::config::GeminiConfig;
use crate::error::{AppError, Result};
use crate::http::RetryPolicy;
use crate::utils::truncate_for_log;

/// Public Gemini REST base.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for async generative-model interaction.
///
/// Implementors send a prompt and receive the model's text. This abstraction
/// allows for different backends or decorators (like retry logic).
pub trait AskAsync {
    /// Send a prompt and receive the model's answer.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The full prompt text
    ///
    /// # Returns
    ///
    /// The answer text, or an error if the request failed.
    async fn ask(&self, prompt: &str) -> Result<String>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let gemini = GeminiAsk::new(client, &config);
    /// let api = RetryAsk::new(gemini, RetryPolicy::new(3, Duration::from_secs(1)));
    /// ```
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(prompt).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.policy.max_retries {
                        error!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.backoff_with_jitter(attempt);
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// One `generateContent` call per prompt.
#[derive(Clone)]
pub struct GeminiAsk {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for GeminiAsk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiAsk")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiAsk {
    pub fn new(client: Client, config: &GeminiConfig) -> Self {
        Self::with_base_url(client, config, GEMINI_BASE_URL)
    }

    pub fn with_base_url(client: Client, config: &GeminiConfig, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

impl AskAsync for GeminiAsk {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String> {
        let t0 = Instant::now();
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&detail, 300),
                "Gemini call failed"
            );
            return Err(AppError::status("gemini generateContent", status));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::generative("answer carried no text"));
        }
        info!(elapsed_ms = t0.elapsed().as_millis() as u64, chars = text.len(), "Gemini answered");
        Ok(text)
    }
}

/// Send one prompt through [`RetryAsk`]-wrapped [`GeminiAsk`].
///
/// # Arguments
///
/// * `api` - The wrapped client
/// * `prompt` - The prompt text
///
/// # Returns
///
/// The model's answer, or the last error once retries are exhausted.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff<T: AskAsync>(api: &RetryAsk<T>, prompt: &str) -> Result<String> {
    let t0 = Instant::now();
    let res = api.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(elapsed_ms_total = dt.as_millis() as u64, "ask_with_backoff succeeded"),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis() as u64, error = %e, "ask_with_backoff failed")
        }
    }
    res
}
