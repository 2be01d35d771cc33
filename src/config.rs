// src/config.rs
// =============================================================================
// Immutable run parameters for a mirror run.
//
// The CLI (src/cli.rs) produces one of these, and after that nobody changes
// it: every worker gets a shared, read-only reference.
//
// Rust concepts:
// - Builder-style defaults: Config::new fills in everything but src/dst
// - Duration: typed time spans instead of "number of seconds" integers
// =============================================================================

use crate::error::ConfigError;
use clap::ValueEnum;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Empty polls in a row before a worker decides the crawl is over
pub const DEFAULT_IDLE_THRESHOLD: u32 = 3;
/// Sleep between two empty polls
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(30);
/// How often the stats collector logs a snapshot
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);
/// Per-request timeout for GET and HEAD
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How workers decide that there is nothing left to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Termination {
    /// Each worker gives up after `idle_threshold` empty polls spaced by
    /// `idle_backoff`. Nobody coordinates; the run ends when all have given up.
    IdleStreak,
    /// Workers stop as soon as the frontier is empty and no page is being
    /// processed anywhere. Idle workers wait for a wake-up instead of sleeping.
    Quiescent,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL. Its path always ends with '/'.
    pub src: Url,
    /// Destination root directory
    pub dst: PathBuf,
    /// Skip the HEAD/Last-Modified check and always GET
    pub force_download: bool,
    /// Number of concurrent workers
    pub num_downloaders: usize,
    /// Bare file names that are fetched and scanned but never written
    pub exclude_files: HashSet<String>,
    pub termination: Termination,
    pub idle_threshold: u32,
    pub idle_backoff: Duration,
    pub stats_interval: Duration,
    pub request_timeout: Duration,
}

impl Config {
    // Creates a config with default knobs for the given source and destination
    //
    // The source URL is normalized so its path ends with '/':
    //   "http://example.com/docs" -> "http://example.com/docs/"
    pub fn new(src: &str, dst: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Config {
            src: normalize_source(src)?,
            dst: dst.into(),
            force_download: false,
            num_downloaders: default_downloaders(),
            exclude_files: HashSet::new(),
            termination: Termination::IdleStreak,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            stats_interval: DEFAULT_STATS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    // Checks the knobs that can't be expressed in the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_downloaders == 0 {
            return Err(ConfigError::NoDownloaders);
        }
        if self.idle_threshold == 0 {
            return Err(ConfigError::ZeroIdleThreshold);
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::ZeroStatsInterval);
        }
        Ok(())
    }

    // Makes sure the destination directory exists before any worker starts
    pub fn prepare_destination(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dst).map_err(|source| ConfigError::Destination {
            path: self.dst.clone(),
            source,
        })
    }

    pub fn is_excluded(&self, file_path: &Path) -> bool {
        file_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.exclude_files.contains(name))
            .unwrap_or(false)
    }
}

fn normalize_source(src: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(src).map_err(|e| ConfigError::InvalidSource {
        url: src.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidSource {
            url: src.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

pub fn default_downloaders() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
