//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use hansard_core::{NormalizeOptions, ProgressReporter, SyncOptions};
use hansard_discovery::HttpFetcher;
use hansard_shared::{AppConfig, init_config, load_config, load_config_from, validate};
use hansard_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Hansard: build a queryable corpus of parliamentary transcripts.
#[derive(Parser)]
#[command(
    name = "hansard",
    version,
    about = "Mirror, retrieve, and normalize parliamentary sitting-day transcripts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.hansard/hansard.toml.
    #[arg(long, global = true, env = "HANSARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Mirror the sitemap index and retrieve changed transcripts.
    Sync {
        /// Stop after registering transcripts.
        #[arg(long)]
        skip_retrieval: bool,

        /// Side-channel directory for timed-out legacy downloads.
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// Rebuild the corpus from retrieved markup.
    Normalize {
        /// Worker pool size (defaults to the configured value).
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show store counts, checkpoint, and recent runs.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "hansard=info",
        1 => "hansard=debug",
        _ => "hansard=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Sync {
            skip_retrieval,
            download_dir,
        } => cmd_sync(config_path, skip_retrieval, download_dir).await,
        Command::Normalize { workers } => cmd_normalize(config_path, workers).await,
        Command::Status { json } => cmd_status(config_path, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(
    config_path: Option<&Path>,
    skip_retrieval: bool,
    download_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if download_dir.is_some() {
        config.retrieval.download_dir = download_dir;
    }
    validate(&config)?;

    let mut opts = SyncOptions::from(&config);
    opts.skip_retrieval = skip_retrieval;

    info!(
        root_url = %opts.discovery.root_url,
        progress_db = %config.storage.progress_db.display(),
        skip_retrieval,
        "starting sync"
    );

    let storage = Storage::open(&config.storage.progress_db).await?;
    let fetcher = HttpFetcher::new(config.index.timeout_secs)?;
    let reporter = CliProgress::new();

    let result = hansard_core::run_sync(&fetcher, &storage, &opts, &reporter).await?;

    println!();
    println!("  Sync complete");
    println!("  Run:         {}", result.run_id);
    println!("  Candidates:  {}", result.identify.candidates);
    println!("  First pages: {}", result.identify.first_pages);
    println!("  Registered:  {}", result.identify.registered);
    match &result.retrieval {
        Some(r) => {
            println!("  Retrieved:   {} ({} unresolved)", r.retrieved, r.unresolved);
            println!("  Failed:      {}", r.failed);
            if r.halted {
                println!("  Halted:      failure limit reached, re-run to resume");
            }
        }
        None => println!("  Retrieval:   skipped"),
    }
    println!("  Time:        {:.1}s", result.elapsed_ms as f64 / 1000.0);
    println!();

    Ok(())
}

async fn cmd_normalize(config_path: Option<&Path>, workers: Option<usize>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(n) = workers {
        config.normalize.workers = n;
    }
    validate(&config)?;

    let opts = NormalizeOptions::from(&config);
    info!(
        workers = opts.workers,
        corpus_db = %config.storage.corpus_db.display(),
        "starting normalize"
    );

    let progress_store = Storage::open(&config.storage.progress_db).await?;
    let corpus_store = Storage::open(&config.storage.corpus_db).await?;
    let reporter = CliProgress::new();

    let result =
        hansard_core::normalize_corpus(&progress_store, &corpus_store, &opts, &reporter).await?;

    println!();
    println!("  Corpus rebuilt");
    println!("  Run:        {}", result.run_id);
    println!("  Documents:  {}", result.documents);
    println!("  Sessions:   {}", result.counts.sessions);
    println!("  Debates:    {}", result.counts.debates);
    println!("  Paragraphs: {}", result.counts.paragraphs);
    println!("  Issues:     {}", result.counts.issues);
    println!("  Time:       {:.1}s", result.elapsed_ms as f64 / 1000.0);
    println!();

    Ok(())
}

async fn cmd_status(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let progress_db = &config.storage.progress_db;
    let corpus_db = &config.storage.corpus_db;

    if !progress_db.exists() {
        return Err(eyre!(
            "no progress store at '{}'; run `hansard sync` first",
            progress_db.display()
        ));
    }

    let progress_store = Storage::open_readonly(progress_db).await?;
    let progress = progress_store.stats().await?;
    let checkpoint = progress_store.load_checkpoint().await?;
    let mut runs = progress_store.recent_runs(5).await?;

    let corpus = if corpus_db.exists() {
        let corpus_store = Storage::open_readonly(corpus_db).await?;
        runs.extend(corpus_store.recent_runs(5).await?);
        Some(corpus_store.stats().await?)
    } else {
        None
    };
    runs.sort_by(|a, b| b.1.cmp(&a.1));
    runs.truncate(5);

    if json {
        let value = serde_json::json!({
            "progress": progress,
            "corpus": corpus,
            "checkpoint": checkpoint.map(|c| serde_json::json!({
                "last_refresh_time": c.last_refresh_time.to_rfc3339(),
                "last_full_refresh_time": c.last_full_refresh_time.to_rfc3339(),
            })),
            "recent_runs": runs.iter().map(|(kind, started, finished, stats)| serde_json::json!({
                "kind": kind,
                "started_at": started,
                "finished_at": finished,
                "stats": stats.as_deref().and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok()),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  Progress store: {}", progress_db.display());
    println!("  Index entries:  {}", progress.index_entries);
    println!("  Visited shards: {}", progress.shards);
    println!(
        "  Transcripts:    {} ({} due, {} with markup, {} unresolved)",
        progress.transcripts, progress.due, progress.with_markup, progress.unresolved
    );
    match checkpoint {
        Some(c) => {
            println!("  Last refresh:   {}", c.last_refresh_time.to_rfc3339());
            println!("  Full refresh:   {}", c.last_full_refresh_time.to_rfc3339());
        }
        None => println!("  Checkpoint:     none"),
    }

    println!();
    match corpus {
        Some(c) => {
            println!("  Corpus store:   {}", corpus_db.display());
            println!("  Sessions:       {}", c.sessions);
            println!("  Debates:        {}", c.debates);
            println!("  Paragraphs:     {}", c.paragraphs);
            println!("  Issues:         {}", c.issues);
        }
        None => println!("  Corpus store:   not built yet"),
    }

    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        for (kind, started, finished, _) in &runs {
            let state = if finished.is_some() { "finished" } else { "incomplete" };
            println!("    {started}  {kind:<10} {state}");
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using indicatif spinners.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!(summary, "done");
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
