//! Error types for the Storyloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] aggregates them.
//!
//! Propagation rules:
//! - `Configuration` and `State` errors are raised before any network call.
//! - `Provider` errors abort the current stage only.
//! - `Validation` errors mean the LLM answered but the answer is unusable.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Storyloom operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap an I/O failure with the path it happened on.
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Whether this error was detected before any network traffic.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::State(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A required predecessor artifact is missing or a request is out of range.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("{artifact} has not been generated yet")]
    MissingArtifact { artifact: &'static str },

    #[error("Chapter {chapter} is outside the blueprint (chapters 1..={available})")]
    ChapterOutOfRange { chapter: u32, available: u32 },

    #[error("Chapter {0} has no text on disk")]
    ChapterMissing(u32),

    #[error("Chapter {0} is empty")]
    EmptyChapter(u32),

    #[error("Invalid project: {0}")]
    InvalidProject(String),
}

/// The LLM answered, but the answer cannot be used.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{stage} stage returned empty output")]
    EmptyOutput { stage: String },

    #[error("Blueprint has {actual} chapter entries, expected {expected}")]
    EntryCountMismatch { expected: u32, actual: u32 },

    #[error("Malformed blueprint: {0}")]
    MalformedBlueprint(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Embedding profile mismatch: store uses {stored}, active configuration is {active}")]
    ProfileMismatch { stored: String, active: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}
