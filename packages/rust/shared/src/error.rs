//! Error types for the Hansard corpus builder.
//!
//! Library crates use [`HansardError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all corpus operations.
#[derive(Debug, thiserror::Error)]
pub enum HansardError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or retrieval.
    #[error("network error: {0}")]
    Network(String),

    /// A fetch exceeded its page-load timeout.
    #[error("timed out fetching {0}")]
    Timeout(String),

    /// Markup (sitemap, reference page, or transcript) could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unexpected identifier shape, missing metadata, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The remote index reported fewer shards than previously known.
    #[error("index has {found} shards, expected at least {floor}; refusing to sync a partial index")]
    IndexShrunk { found: usize, floor: usize },

    /// More than one candidate link of a kind that must be unique.
    #[error("ambiguous page layout: {0}")]
    Ambiguity(String),

    /// Parsed markup whose semantic assembly is not defined.
    #[error("assembly not supported: {0}")]
    Assembly(String),

    /// A background normalization task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HansardError>;

impl HansardError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that abort a discovery run outright.
    pub fn is_fatal_discovery(&self) -> bool {
        matches!(
            self,
            Self::IndexShrunk { .. } | Self::Network(_) | Self::Timeout(_) | Self::Parse { .. }
        )
    }

    /// Short machine-readable label, used when recording per-document issues.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Parse { .. } => "parse",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
            Self::IndexShrunk { .. } => "index_shrunk",
            Self::Ambiguity(_) => "ambiguity",
            Self::Assembly(_) => "assembly",
            Self::Worker(_) => "worker",
        }
    }
}
