//! Core orchestration for the Hansard corpus builder.
//!
//! This crate ties discovery, retrieval, and normalization into end-to-end
//! workflows: [`pipeline::run_sync`] keeps the progress store current and
//! [`orchestrator::normalize_corpus`] rebuilds the corpus from it.

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{NormalizeOptions, NormalizeRunResult, normalize_corpus};
pub use pipeline::{ProgressReporter, SilentProgress, SyncOptions, SyncRunResult, run_sync};
