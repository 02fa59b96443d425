//! Shared HTTP client and bounded retry for transient failures.
//!
//! Every outbound call (feeds, robots, article pages, Notion, Gemini) goes
//! through one [`reqwest::Client`] carrying the agent's user agent and the
//! configured timeout. [`send_with_retry`] retries transport errors and
//! `429`/`5xx` answers a few times with exponential backoff plus jitter;
//! after that the response (or error) is handed back and the caller's
//! fallback or skip policy takes over.

use std::time::{Duration, Instant};

use rand::{Rng, rng};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::user_agent;
use crate::error::Result;

/// Statuses worth another attempt.
const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Exponential backoff settings.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Backoff plus up to 250ms of jitter; zero stays zero.
    pub fn backoff_with_jitter(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            return delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

/// Build the client shared by every stage.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    Ok(client)
}

/// Send a request, retrying transient failures per `policy`.
///
/// Returns the last response even when its status is an error; only the final
/// transport failure is surfaced as `Err`. Requests whose body cannot be
/// cloned are sent once.
pub async fn send_with_retry(request: RequestBuilder, policy: &RetryPolicy) -> Result<Response> {
    let t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        let this_try = match request.try_clone() {
            Some(r) => r,
            None => return Ok(request.send().await?),
        };

        let outcome = this_try.send().await;
        let retryable = match &outcome {
            Ok(resp) => RETRY_STATUSES.contains(&resp.status()),
            Err(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        };
        if !retryable {
            return Ok(outcome?);
        }

        attempt += 1;
        if attempt > policy.max_retries {
            match &outcome {
                Ok(resp) => warn!(
                    attempt,
                    status = resp.status().as_u16(),
                    elapsed_ms_total = t0.elapsed().as_millis() as u64,
                    "HTTP retries exhausted"
                ),
                Err(e) => error!(
                    attempt,
                    error = %e,
                    elapsed_ms_total = t0.elapsed().as_millis() as u64,
                    "HTTP retries exhausted"
                ),
            }
            return Ok(outcome?);
        }

        let delay = policy.backoff_with_jitter(attempt);
        match &outcome {
            Ok(resp) => warn!(attempt, max = policy.max_retries, status = resp.status().as_u16(), ?delay, "transient HTTP status; backing off"),
            Err(e) => warn!(attempt, max = policy.max_retries, error = %e, ?delay, "HTTP attempt failed; backing off"),
        }
        sleep(delay).await;
    }
}
