//! Retrieval Worker: fetch the authoritative markup for each stale transcript.
//!
//! Items are processed oldest staleness first, one at a time, with a minimum
//! cycle time between item starts. For each item:
//!
//! 1. Fetch the reference page and read its links and metadata.
//! 2. Prefer the structured XML link; otherwise derive the legacy SGML location.
//! 3. Fetch the markup. A timed-out legacy download may be recovered from the
//!    side-channel download directory.
//! 4. Unwrap content served inside an HTML display wrapper.
//! 5. Persist the result in one transaction.
//!
//! Item failures are isolated and counted. The run halts once the count
//! reaches the configured limit.

pub mod reference;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use hansard_shared::{
    AppConfig, DueTranscript, HansardError, MarkupDialect, PageFetcher, Result,
    RetrievedTranscript,
};
use hansard_storage::Storage;
use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub use reference::{LegacyLocation, ReferencePage};

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

/// Configuration for a retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Minimum time between the starts of consecutive items.
    pub cycle: Duration,
    /// Failures after which the run stops.
    pub max_failures: usize,
    /// Where the fetch infrastructure leaves downloaded artifacts.
    pub download_dir: Option<PathBuf>,
    /// Base location for legacy SGML downloads.
    pub legacy_download_base: String,
}

impl From<&AppConfig> for RetrievalOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            cycle: Duration::from_millis(config.retrieval.cycle_ms),
            max_failures: config.retrieval.max_failures,
            download_dir: config.retrieval.download_dir.clone(),
            legacy_download_base: config.retrieval.legacy_download_base.clone(),
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Counts from one retrieval run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetrievalOutcome {
    /// Items started.
    pub attempted: usize,
    /// Items committed, including those with unresolved markup.
    pub retrieved: usize,
    /// Committed items whose markup could not be unwrapped.
    pub unresolved: usize,
    /// Items rolled back.
    pub failed: usize,
    /// Whether the failure limit stopped the run early.
    pub halted: bool,
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for retrieval runs.
pub trait RetrievalProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Task-level progress within the current phase.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op retrieval progress.
pub struct SilentRetrievalProgress;

impl RetrievalProgress for SilentRetrievalProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Retrieval run
// ---------------------------------------------------------------------------

/// Retrieve every due transcript, oldest staleness first.
#[instrument(skip_all, fields(max_failures = opts.max_failures))]
pub async fn retrieve_due<F: PageFetcher>(
    fetcher: &F,
    storage: &Storage,
    opts: &RetrievalOptions,
    progress: &dyn RetrievalProgress,
) -> Result<RetrievalOutcome> {
    let due = storage.list_due_transcripts().await?;
    let total = due.len();
    info!(due = total, "retrieving stale transcripts");
    progress.phase(&format!("Retrieving {total} transcripts"));

    let mut outcome = RetrievalOutcome::default();
    let mut last_start: Option<Instant> = None;

    for (i, item) in due.iter().enumerate() {
        if outcome.failed >= opts.max_failures {
            warn!(
                failed = outcome.failed,
                remaining = total - i,
                "too many failures, halting retrieval"
            );
            outcome.halted = true;
            break;
        }

        if let Some(start) = last_start {
            let remaining = opts.cycle.saturating_sub(start.elapsed());
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
        }
        last_start = Some(Instant::now());

        progress.task_progress(i + 1, total, &item.location);
        outcome.attempted += 1;

        match retrieve_one(fetcher, storage, opts, item).await {
            Ok(resolved) => {
                outcome.retrieved += 1;
                if !resolved {
                    outcome.unresolved += 1;
                }
            }
            Err(e) => {
                outcome.failed += 1;
                warn!(
                    location = %item.location,
                    error = %e,
                    failed = outcome.failed,
                    "retrieval failed"
                );
            }
        }
    }

    info!(
        attempted = outcome.attempted,
        retrieved = outcome.retrieved,
        unresolved = outcome.unresolved,
        failed = outcome.failed,
        halted = outcome.halted,
        "retrieval finished"
    );

    Ok(outcome)
}

/// Fetch, resolve, and commit one item. Returns whether the markup resolved.
async fn retrieve_one<F: PageFetcher>(
    fetcher: &F,
    storage: &Storage,
    opts: &RetrievalOptions,
    item: &DueTranscript,
) -> Result<bool> {
    let retrieved_at = Utc::now();

    let reference_html = fetcher.fetch(&item.location).await?;
    let page = ReferencePage::parse(&item.location, &reference_html)?;
    let pdf_link = page.pdf_link()?.map(str::to_string);

    let (markup_link, dialect, fetched) = match page.structured_markup_link()? {
        Some(link) => {
            let link = link.to_string();
            let body = fetcher.fetch(&link).await?;
            (link, MarkupDialect::Xml, body)
        }
        None => {
            let legacy = page.legacy_markup_location(&opts.legacy_download_base)?;
            let body = fetch_legacy(fetcher, opts, &legacy).await?;
            (legacy.link, MarkupDialect::Legacy, body)
        }
    };

    let markup = if is_display_wrapper(&fetched) {
        unwrap_display_wrapper(&fetched, dialect)
    } else {
        Some(fetched)
    };
    if markup.is_none() {
        warn!(location = %item.location, %markup_link, "markup left unresolved");
    }
    let resolved = markup.is_some();

    let record = RetrievedTranscript {
        location: item.location.clone(),
        retrieved_at,
        reference_page: reference_html,
        pdf_link,
        markup_link,
        dialect,
        markup,
    };

    storage.begin().await?;
    match storage.record_retrieval(&record).await {
        Ok(()) => storage.commit().await?,
        Err(e) => {
            storage.rollback().await?;
            return Err(e);
        }
    }

    debug!(location = %item.location, %dialect, resolved, "transcript retrieved");
    Ok(resolved)
}

/// Fetch a legacy transcript, falling back to the side-channel copy on timeout.
async fn fetch_legacy<F: PageFetcher>(
    fetcher: &F,
    opts: &RetrievalOptions,
    legacy: &LegacyLocation,
) -> Result<String> {
    match fetcher.fetch(&legacy.link).await {
        Err(HansardError::Timeout(url)) => {
            let Some(dir) = &opts.download_dir else {
                return Err(HansardError::Timeout(url));
            };
            let path = dir.join(&legacy.artifact_name);
            if !path.exists() {
                debug!(?path, "no side-channel copy after timeout");
                return Err(HansardError::Timeout(url));
            }
            info!(?path, "recovering timed-out download from side channel");
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| HansardError::io(&path, e))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Display wrapper anomaly
// ---------------------------------------------------------------------------

fn is_display_wrapper(markup: &str) -> bool {
    markup
        .trim_start()
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("<html"))
}

/// Recover raw markup from an HTML display wrapper.
///
/// Markup that is not wrapped is returned unchanged. A wrapped legacy
/// transcript is recovered from its single `html > body > pre` region. Anything
/// else yields `None`.
pub fn unwrap_display_wrapper(markup: &str, dialect: MarkupDialect) -> Option<String> {
    if !is_display_wrapper(markup) {
        return Some(markup.to_string());
    }

    if dialect == MarkupDialect::Xml {
        warn!("structured markup served inside a display wrapper");
        return None;
    }

    let doc = Html::parse_document(markup);
    let pre_sel = Selector::parse("html > body > pre").expect("valid selector");
    let regions: Vec<_> = doc.select(&pre_sel).collect();

    match regions.as_slice() {
        [pre] => Some(pre.text().collect()),
        _ => {
            warn!(
                regions = regions.len(),
                "expected exactly one raw-text region in display wrapper"
            );
            None
        }
    }
}
