//! End-to-end `sync` pipeline: sitemap index → transcript records → raw markup.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use hansard_discovery::{DiscoveryOptions, IdentifyResult};
use hansard_retrieval::{RetrievalOptions, RetrievalOutcome, RetrievalProgress};
use hansard_shared::{AppConfig, CrawlCheckpoint, PageFetcher, Result};
use hansard_storage::Storage;

/// Configuration for the `sync` pipeline.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Discovery crawler settings.
    pub discovery: DiscoveryOptions,
    /// Retrieval worker settings.
    pub retrieval: RetrievalOptions,
    /// Stop after transcript identification.
    pub skip_retrieval: bool,
}

impl From<&AppConfig> for SyncOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            discovery: DiscoveryOptions::from(config),
            retrieval: RetrievalOptions::from(config),
            skip_retrieval: false,
        }
    }
}

/// Result of the `sync` pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunResult {
    /// `pipeline_runs` row for this run.
    pub run_id: String,
    /// Checkpoint after the discovery pass.
    #[serde(skip)]
    pub checkpoint: Option<CrawlCheckpoint>,
    /// Transcript identification counts.
    pub identify: IdentifyResult,
    /// Retrieval counts, absent when retrieval was skipped.
    pub retrieval: Option<RetrievalOutcome>,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each item (transcript or document) is processed.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &str) {}
}

/// Run the full `sync` pipeline.
///
/// 1. Discovery: mirror the sitemap index incrementally
/// 2. Identify first-page transcripts
/// 3. Retrieve stale transcripts (unless skipped)
///
/// The run is logged in `pipeline_runs`, with the error text if it fails.
#[instrument(skip_all, fields(skip_retrieval = opts.skip_retrieval))]
pub async fn run_sync<F: PageFetcher>(
    fetcher: &F,
    storage: &Storage,
    opts: &SyncOptions,
    progress: &dyn ProgressReporter,
) -> Result<SyncRunResult> {
    let start = Instant::now();
    let run_id = storage.insert_run("sync").await?;
    info!(%run_id, "starting sync pipeline");

    let outcome = sync_phases(fetcher, storage, opts, progress).await;

    let (checkpoint, identify, retrieval) = match outcome {
        Ok(parts) => parts,
        Err(e) => {
            let stats = serde_json::json!({ "error": e.to_string() });
            if let Err(log_err) = storage.finish_run(&run_id, &stats.to_string()).await {
                warn!(error = %log_err, "failed to record failed run");
            }
            return Err(e);
        }
    };

    let result = SyncRunResult {
        run_id,
        checkpoint: Some(checkpoint),
        identify,
        retrieval,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    let stats = serde_json::to_string(&result).unwrap_or_default();
    storage.finish_run(&result.run_id, &stats).await?;

    let summary = match &result.retrieval {
        Some(r) => format!(
            "{} transcripts registered, {} retrieved, {} failed",
            result.identify.registered, r.retrieved, r.failed
        ),
        None => format!(
            "{} transcripts registered, retrieval skipped",
            result.identify.registered
        ),
    };
    progress.done(&summary);

    info!(
        run_id = %result.run_id,
        first_pages = result.identify.first_pages,
        elapsed_ms = result.elapsed_ms,
        "sync pipeline complete"
    );

    Ok(result)
}

async fn sync_phases<F: PageFetcher>(
    fetcher: &F,
    storage: &Storage,
    opts: &SyncOptions,
    progress: &dyn ProgressReporter,
) -> Result<(CrawlCheckpoint, IdentifyResult, Option<RetrievalOutcome>)> {
    // --- Phase 1: Discovery ---
    progress.phase("Syncing sitemap index");
    let checkpoint =
        hansard_discovery::initialize_and_sync(fetcher, storage, None, &opts.discovery).await?;

    // --- Phase 2: Identification ---
    progress.phase("Identifying transcripts");
    let identify = hansard_discovery::identify_transcripts(storage).await?;

    // --- Phase 3: Retrieval ---
    if opts.skip_retrieval {
        return Ok((checkpoint, identify, None));
    }

    let retrieval_progress = PipelineRetrievalProgress { inner: progress };
    let retrieval =
        hansard_retrieval::retrieve_due(fetcher, storage, &opts.retrieval, &retrieval_progress)
            .await?;

    Ok((checkpoint, identify, Some(retrieval)))
}

// ---------------------------------------------------------------------------
// Retrieval progress adapter
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the `RetrievalProgress` interface.
struct PipelineRetrievalProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl RetrievalProgress for PipelineRetrievalProgress<'_> {
    fn phase(&self, name: &str) {
        self.inner.phase(name);
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.inner.item_progress(current, total, detail);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use hansard_shared::{HansardError, MarkupDialect};
    use uuid::Uuid;

    const INDEX: &str = "https://idx.test/sitemapindex.xml";
    const SHARD: &str = "https://idx.test/sitemap_1.xml";
    const DAY: &str = "https://idx.test/parlInfo/search/display/display.w3p;query=Id%3A%22chamber%2Fhansardr%2F2012-06-20%2F0000%22";
    const PAGE_TWO: &str = "https://idx.test/parlInfo/search/display/display.w3p;query=Id%3A%22chamber%2Fhansardr%2F2012-06-20%2F0001%22";
    const MARKUP: &str = "https://idx.test/download/chamber/hansardr/2012-06-20/toc_unixml/day.xml";

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| HansardError::Network(format!("{url}: HTTP 404 Not Found")))
        }
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("hansard_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn options() -> SyncOptions {
        SyncOptions {
            discovery: DiscoveryOptions {
                root_url: INDEX.into(),
                shard_floor: 1,
                shard_delay: Duration::ZERO,
                refresh_margin_days: 3,
            },
            retrieval: RetrievalOptions {
                cycle: Duration::ZERO,
                ..RetrievalOptions::default()
            },
            skip_retrieval: false,
        }
    }

    fn fetcher() -> FakeFetcher {
        let shard = format!(
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>{}</loc><lastmod>2024-05-20</lastmod></url>
              <url><loc>{}</loc><lastmod>2024-05-20</lastmod></url>
            </urlset>"#,
            DAY.replace('&', "&amp;"),
            PAGE_TWO.replace('&', "&amp;"),
        );
        FakeFetcher::default()
            .page(
                INDEX,
                format!(
                    r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                      <sitemap><loc>{SHARD}</loc></sitemap>
                    </sitemapindex>"#
                ),
            )
            .page(SHARD, shard)
            .page(
                DAY,
                format!(r#"<html><body><a href="{MARKUP}">XML</a></body></html>"#),
            )
            .page(MARKUP, "<hansard/>")
    }

    #[tokio::test]
    async fn sync_discovers_and_retrieves() {
        let storage = test_storage().await;
        let fetcher = fetcher();

        let result = run_sync(&fetcher, &storage, &options(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.identify.first_pages, 1);
        assert_eq!(result.identify.registered, 1);
        let retrieval = result.retrieval.unwrap();
        assert_eq!(retrieval.retrieved, 1);
        assert_eq!(retrieval.failed, 0);

        let markup = storage.load_markup(DAY).await.unwrap().unwrap();
        assert_eq!(markup.dialect, MarkupDialect::Xml);
        assert_eq!(markup.markup, "<hansard/>");

        let runs = storage.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "sync");
        assert!(runs[0].2.is_some());
    }

    #[tokio::test]
    async fn second_sync_changes_nothing() {
        let storage = test_storage().await;
        let fetcher = fetcher();

        run_sync(&fetcher, &storage, &options(), &SilentProgress)
            .await
            .unwrap();
        let before = storage.stats().await.unwrap();
        let record_before = storage.get_transcript(DAY).await.unwrap();

        let second = run_sync(&fetcher, &storage, &options(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(second.identify.registered, 0);
        assert_eq!(second.retrieval.unwrap().attempted, 0);

        assert_eq!(storage.stats().await.unwrap(), before);
        assert_eq!(storage.get_transcript(DAY).await.unwrap(), record_before);
    }

    #[tokio::test]
    async fn skip_retrieval_stops_after_identification() {
        let storage = test_storage().await;
        let fetcher = fetcher();
        let opts = SyncOptions {
            skip_retrieval: true,
            ..options()
        };

        let result = run_sync(&fetcher, &storage, &opts, &SilentProgress)
            .await
            .unwrap();
        assert!(result.retrieval.is_none());
        // Index and one shard only; no reference pages.
        assert!(fetcher.request_count() <= 3);
        assert_eq!(storage.list_due_transcripts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_sync_is_logged() {
        let storage = test_storage().await;
        let fetcher = FakeFetcher::default();

        let err = run_sync(&fetcher, &storage, &options(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.is_fatal_discovery());

        let runs = storage.recent_runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].3.as_deref().unwrap().contains("error"));
    }
}
