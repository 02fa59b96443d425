//! Unified error type for the ingestion pipeline.
//!
//! Almost every error here is recoverable: feed, extraction, summarization
//! and destination failures are caught at the stage boundary that raised them,
//! logged, and turned into a fallback or a skip. Only configuration errors
//! are allowed to stop a run.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed at the transport layer
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML feed list could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Feed body could not be parsed as RSS/Atom
    #[error("Feed parse error: {0}")]
    Feed(String),

    /// Remote answered with a status we do not accept
    #[error("{context} returned HTTP {status}")]
    Status { context: String, status: u16 },

    /// Notion API answered with an unusable payload
    #[error("Notion error: {0}")]
    Notion(String),

    /// Generative service failed or returned an unusable payload
    #[error("Generative service error: {0}")]
    Generative(String),

    /// A strategy ran but produced nothing usable
    #[error("empty result from {0}")]
    Empty(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(context: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Self::Status {
            context: context.into(),
            status: status.as_u16(),
        }
    }

    pub fn feed(message: impl fmt::Display) -> Self {
        Self::Feed(message.to_string())
    }

    pub fn notion(message: impl fmt::Display) -> Self {
        Self::Notion(message.to_string())
    }

    pub fn generative(message: impl fmt::Display) -> Self {
        Self::Generative(message.to_string())
    }

    pub fn empty(what: impl Into<String>) -> Self {
        Self::Empty(what.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let status = |s: u16| AppError::Status {
            context: "x".into(),
            status: s,
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
        assert!(!AppError::generative("bad payload").is_transient());
        assert!(!AppError::config("missing").is_transient());
    }

    #[test]
    fn test_status_display() {
        let err = AppError::status("feed https://example.com/feed", reqwest::StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "feed https://example.com/feed returned HTTP 404");
    }
}
