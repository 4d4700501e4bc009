//! Error types for MeetNews.
//!
//! Library crates use [`MeetNewsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all MeetNews operations.
#[derive(Debug, thiserror::Error)]
pub enum MeetNewsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search, fetch, or summarization.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Summarization API or response error.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// Scoring model load or inference error.
    #[error("ranking error: {0}")]
    Ranking(String),

    /// Task queue closed or dispatch failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// A bounded wait elapsed.
    #[error("timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    /// A record does not exist (or is not visible to the caller).
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing fields, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MeetNewsError>;

impl MeetNewsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MeetNewsError::config("unknown task kind 'foo'");
        assert_eq!(err.to_string(), "config error: unknown task kind 'foo'");

        let err = MeetNewsError::Timeout {
            what: "rank_similarity".into(),
            secs: 300,
        };
        assert!(err.to_string().contains("300s"));

        let err = MeetNewsError::not_found("meeting 4");
        assert_eq!(err.to_string(), "not found: meeting 4");
    }
}
