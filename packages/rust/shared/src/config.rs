//! Application configuration for the Hansard corpus builder.
//!
//! User config lives at `~/.hansard/hansard.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HansardError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hansard.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hansard";

// ---------------------------------------------------------------------------
// Config structs (matching hansard.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote index discovery.
    #[serde(default)]
    pub index: IndexConfig,

    /// Transcript retrieval.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Markup normalization.
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Database locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root of the sharded document index.
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Historical minimum number of shards; fewer means a broken fetch.
    #[serde(default = "default_shard_floor")]
    pub shard_floor: usize,

    /// Politeness delay between shard fetches.
    #[serde(default = "default_shard_delay")]
    pub shard_delay_ms: u64,

    /// Days subtracted from the last refresh to absorb date-only granularity.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_days: i64,

    /// Page-load timeout for every fetch.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            shard_floor: default_shard_floor(),
            shard_delay_ms: default_shard_delay(),
            refresh_margin_days: default_refresh_margin(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_root_url() -> String {
    "https://parlinfo.aph.gov.au/sitemap/sitemapindex.xml".into()
}
fn default_shard_floor() -> usize {
    2217
}
fn default_shard_delay() -> u64 {
    15_000
}
fn default_refresh_margin() -> i64 {
    3
}
fn default_timeout() -> u64 {
    10
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum time between the starts of consecutive items.
    #[serde(default = "default_cycle")]
    pub cycle_ms: u64,

    /// Failures after which a retrieval run stops.
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,

    /// Directory where the fetch infrastructure drops downloaded artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Base location for legacy-dialect downloads.
    #[serde(default = "default_legacy_base")]
    pub legacy_download_base: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cycle_ms: default_cycle(),
            max_failures: default_max_failures(),
            download_dir: None,
            legacy_download_base: default_legacy_base(),
        }
    }
}

fn default_cycle() -> u64 {
    20_000
}
fn default_max_failures() -> usize {
    10
}
fn default_legacy_base() -> String {
    "https://parlinfo.aph.gov.au/parlInfo/download".into()
}

/// `[normalize]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Worker pool size, and the bound on documents in flight.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Transcripts known to be broken upstream.
    #[serde(default = "default_ignore_locations")]
    pub ignore_locations: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ignore_locations: default_ignore_locations(),
        }
    }
}

fn default_workers() -> usize {
    8
}
fn default_ignore_locations() -> Vec<String> {
    // Links to an HTML error page instead of a transcript.
    vec![
        "https://parlinfo.aph.gov.au/parlInfo/search/display/display.w3p;query=Id%3A%22chamber%2Fhansards%2F2004-02-10%2F0000%22;src1=sm1".into(),
    ]
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Index mirror, checkpoint, and retrieval state.
    #[serde(default = "default_progress_db")]
    pub progress_db: PathBuf,

    /// Normalized corpus tables.
    #[serde(default = "default_corpus_db")]
    pub corpus_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            progress_db: default_progress_db(),
            corpus_db: default_corpus_db(),
        }
    }
}

fn default_progress_db() -> PathBuf {
    "transcripts_progress.db".into()
}
fn default_corpus_db() -> PathBuf {
    "oz_federal_hansard.db".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hansard/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HansardError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hansard/hansard.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HansardError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| HansardError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HansardError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HansardError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HansardError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings that would make a run meaningless.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.normalize.workers == 0 {
        return Err(HansardError::config("normalize.workers must be at least 1"));
    }
    if config.retrieval.max_failures == 0 {
        return Err(HansardError::config(
            "retrieval.max_failures must be at least 1",
        ));
    }
    if config.index.refresh_margin_days < 0 {
        return Err(HansardError::config(
            "index.refresh_margin_days must not be negative",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("root_url"));
        assert!(toml_str.contains("shard_floor = 2217"));
        assert!(toml_str.contains("transcripts_progress.db"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retrieval.max_failures, 10);
        assert_eq!(parsed.normalize.workers, 8);
        assert_eq!(parsed.normalize.ignore_locations.len(), 1);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[index]
shard_delay_ms = 0

[retrieval]
download_dir = "/tmp/downloads"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.index.shard_delay_ms, 0);
        assert_eq!(config.index.shard_floor, 2217);
        assert_eq!(
            config.retrieval.download_dir.as_deref(),
            Some(Path::new("/tmp/downloads"))
        );
        assert_eq!(config.retrieval.cycle_ms, 20_000);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.normalize.workers = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "hansard_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[normalize]\nworkers = 2\n").expect("write config");
        let config = load_config_from(&path).expect("load config");
        assert_eq!(config.normalize.workers, 2);
        let _ = std::fs::remove_file(&path);
    }
}
