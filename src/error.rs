// src/error.rs

//! Unified error handling for the archive bot.

use thiserror::Error;

/// Result type alias for bot operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Redis command failed
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Alias pattern failed to compile
    #[error("alias pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Upstream replied with a non-success status
    #[error("unexpected status {status} from {context}")]
    Status { status: u16, context: String },

    /// Both paging cursors were set on one listing request
    #[error("both before and after cursors are set")]
    ConflictingCursors,

    /// A persisted anchor string did not parse
    #[error("invalid anchor '{value}': {message}")]
    Anchor { value: String, message: String },

    /// A rate-limit header was present but not an integer
    #[error("could not parse rate limit header {header}: '{value}'")]
    RateLimitHeader { header: String, value: String },

    /// History batch limit below the workable minimum
    #[error("history limit must be at least 2, got {0}")]
    InvalidLimit(u32),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an anchor parse error.
    pub fn anchor(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Anchor {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a status error with request context.
    pub fn status(status: u16, context: impl Into<String>) -> Self {
        Self::Status {
            status,
            context: context.into(),
        }
    }
}

/// Malformed-input policy: halt in development to surface bugs early,
/// log and skip the operation in production to preserve availability.
pub fn dfatal(is_production: bool, err: &AppError) {
    if is_production {
        log::error!("{err}");
    } else {
        panic!("{err}");
    }
}
