//! Shared types, error model, and configuration for the Hansard corpus builder.
//!
//! This crate is the foundation depended on by all other crates.
//! It provides:
//! - [`HansardError`]: the unified error type
//! - Domain types ([`IndexEntry`], [`CrawlCheckpoint`], [`TranscriptRecord`], corpus rows)
//! - Configuration ([`AppConfig`] and config loading)
//! - The [`PageFetcher`] seam used by discovery and retrieval

pub mod config;
pub mod error;
pub mod fetch;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, IndexConfig, NormalizeConfig, RetrievalConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate,
};
pub use error::{HansardError, Result};
pub use fetch::PageFetcher;
pub use types::{
    CrawlCheckpoint, Debate, DueTranscript, EPOCH_SENTINEL, EnclosingContextTag, IndexEntry,
    MarkupDialect, Paragraph, RetrievedTranscript, Session, StoredMarkup, TranscriptRecord,
};
