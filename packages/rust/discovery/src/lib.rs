//! Discovery Crawler: incremental mirror of the remote sitemap index.
//!
//! The remote index is a sitemap index whose shards are ordered by the
//! recency of their entries. A run has two phases, both newest-first:
//!
//! 1. **Init**: visit every shard never seen before (resumable by skip-set).
//! 2. **Refresh**: re-visit shards until one's newest entry falls at or before
//!    the refresh cutoff derived from the [`CrawlCheckpoint`].
//!
//! Each shard's entries are committed as one transaction, so an interrupted
//! run leaves only whole shards behind.

pub mod fetch;
pub mod sitemap;
mod transcripts;

use std::time::Duration;

use chrono::Utc;
use hansard_shared::{AppConfig, CrawlCheckpoint, HansardError, IndexEntry, PageFetcher, Result};
use hansard_storage::Storage;
use tracing::{debug, info, instrument};

pub use fetch::HttpFetcher;
pub use sitemap::ShardEntry;
pub use transcripts::{IdentifyResult, identify_transcripts, transcript_id};

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Location of the sitemap index.
    pub root_url: String,
    /// Fewer shards than this means the index fetch was broken.
    pub shard_floor: usize,
    /// Politeness delay between shard fetches.
    pub shard_delay: Duration,
    /// Days to back off from the last refresh when computing the cutoff.
    pub refresh_margin_days: i64,
}

impl From<&AppConfig> for DiscoveryOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            root_url: config.index.root_url.clone(),
            shard_floor: config.index.shard_floor,
            shard_delay: Duration::from_millis(config.index.shard_delay_ms),
            refresh_margin_days: config.index.refresh_margin_days,
        }
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Bring the local index mirror up to date and return the advanced checkpoint.
///
/// With no `checkpoint` given, the stored one is used, or a fresh one is
/// created. Every error is fatal for the run. A shrunken index is rejected
/// before anything is written.
#[instrument(skip_all, fields(root = %opts.root_url))]
pub async fn initialize_and_sync<F: PageFetcher>(
    fetcher: &F,
    storage: &Storage,
    checkpoint: Option<CrawlCheckpoint>,
    opts: &DiscoveryOptions,
) -> Result<CrawlCheckpoint> {
    let index = fetcher.fetch(&opts.root_url).await?;
    let shards = sitemap::parse_sitemap_index(&index)?;

    if shards.len() < opts.shard_floor {
        return Err(HansardError::IndexShrunk {
            found: shards.len(),
            floor: opts.shard_floor,
        });
    }

    let checkpoint = match checkpoint {
        Some(checkpoint) => checkpoint,
        None => match storage.load_checkpoint().await? {
            Some(stored) => stored,
            None => {
                let fresh = CrawlCheckpoint::new(Utc::now());
                storage.init_checkpoint(&fresh).await?;
                fresh
            }
        },
    };

    info!(shards = shards.len(), "sitemap index fetched");

    let mut pacer = ShardPacer::new(opts.shard_delay);

    // Init phase
    let visited = storage.visited_partitions().await?;
    let pending: Vec<&String> = shards
        .iter()
        .rev()
        .filter(|shard| !visited.contains(shard.as_str()))
        .collect();

    info!(pending = pending.len(), visited = visited.len(), "initialising index mirror");

    for (i, shard) in pending.iter().enumerate() {
        pacer.wait().await;
        let entries = sync_shard(fetcher, storage, shard).await?;
        debug!(shard = %shard, n = i + 1, of = pending.len(), entries, "shard initialised");
    }

    // Refresh phase
    let cutoff = checkpoint
        .refresh_cutoff(opts.refresh_margin_days)
        .format("%Y-%m-%d")
        .to_string();
    info!(%cutoff, "refreshing index mirror");

    let mut refreshed = 0usize;
    for shard in shards.iter().rev() {
        pacer.wait().await;
        let entries = fetch_shard(fetcher, shard).await?;
        commit_shard(storage, shard, &entries).await?;
        refreshed += 1;

        let newest = entries.iter().map(|e| e.last_modified.as_str()).max();
        debug!(shard = %shard, ?newest, "shard refreshed");

        if newest.is_none_or(|newest| newest <= cutoff.as_str()) {
            break;
        }
    }

    let checkpoint = checkpoint.refreshed(Utc::now());
    storage.save_checkpoint(&checkpoint).await?;

    info!(
        initialised = pending.len(),
        refreshed,
        last_refresh = %checkpoint.last_refresh_time,
        "index mirror synced"
    );

    Ok(checkpoint)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Enforces the fixed delay between consecutive shard fetches.
struct ShardPacer {
    delay: Duration,
    first: bool,
}

impl ShardPacer {
    fn new(delay: Duration) -> Self {
        Self { delay, first: true }
    }

    async fn wait(&mut self) {
        if self.first {
            self.first = false;
        } else if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

async fn sync_shard<F: PageFetcher>(fetcher: &F, storage: &Storage, shard: &str) -> Result<usize> {
    let entries = fetch_shard(fetcher, shard).await?;
    commit_shard(storage, shard, &entries).await?;
    Ok(entries.len())
}

async fn fetch_shard<F: PageFetcher>(fetcher: &F, shard: &str) -> Result<Vec<ShardEntry>> {
    let body = fetcher.fetch(shard).await?;
    sitemap::parse_sitemap_shard(&body)
}

/// Overwrite the shard's entries in one transaction.
async fn commit_shard(storage: &Storage, shard: &str, entries: &[ShardEntry]) -> Result<()> {
    storage.begin().await?;
    for entry in entries {
        let row = IndexEntry {
            location: entry.location.clone(),
            source_partition: shard.to_string(),
            last_modified: entry.last_modified.clone(),
        };
        if let Err(e) = storage.upsert_index_entry(&row).await {
            storage.rollback().await?;
            return Err(e);
        }
    }
    storage.commit().await
}
