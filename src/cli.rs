// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API: the struct below IS the CLI. clap reads the
// field names, doc comments and #[arg(...)] attributes and generates the
// parser, --help output and error messages for us.
//
// The parsed Cli is turned into a Config (src/config.rs) right away, so the
// rest of the program never sees raw flags.
// =============================================================================

use crate::config::{self, Config, Termination};
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    version = "0.1.0",
    about = "Mirror a website to a local directory",
    long_about = "site-mirror crawls every page under a root URL and saves it to disk, \
                  mirroring the URL hierarchy. On later runs it asks the server (HEAD) \
                  whether each page changed and only downloads the ones that did."
)]
pub struct Cli {
    /// Root URL to mirror (e.g., https://example.com/docs/)
    ///
    /// Only pages whose path starts with this URL's path are crawled
    pub src: String,

    /// Directory to mirror into (created if missing)
    pub dst: PathBuf,

    /// Always re-download, ignoring Last-Modified and Content-Length
    #[arg(long)]
    pub force_download: bool,

    /// Number of pages downloaded concurrently (defaults to the CPU count)
    #[arg(long)]
    pub num_downloaders: Option<usize>,

    /// File name that is fetched but never stored to disk
    ///
    /// Can be given multiple times: --exclude-file index.html --exclude-file robots.txt
    #[arg(long = "exclude-file", value_name = "NAME")]
    pub exclude_files: Vec<String>,

    /// How workers decide the crawl is finished
    #[arg(long, value_enum, default_value_t = Termination::IdleStreak)]
    pub termination: Termination,

    /// Empty polls in a row before a worker stops (idle-streak mode)
    #[arg(long, default_value_t = config::DEFAULT_IDLE_THRESHOLD)]
    pub idle_threshold: u32,

    /// Seconds to sleep between empty polls (idle-streak mode)
    #[arg(long, default_value_t = config::DEFAULT_IDLE_BACKOFF.as_secs())]
    pub idle_backoff_secs: u64,

    /// Seconds between stats snapshots in the log
    #[arg(long, default_value_t = config::DEFAULT_STATS_INTERVAL.as_secs())]
    pub stats_interval_secs: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Print the final report as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Log every claim, idle poll and cache decision
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    // Converts parsed flags into a validated Config
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = Config::new(&self.src, self.dst)?;
        config.force_download = self.force_download;
        if let Some(n) = self.num_downloaders {
            config.num_downloaders = n;
        }
        config.exclude_files = self.exclude_files.into_iter().collect();
        config.termination = self.termination;
        config.idle_threshold = self.idle_threshold;
        config.idle_backoff = Duration::from_secs(self.idle_backoff_secs);
        config.stats_interval = Duration::from_secs(self.stats_interval_secs);
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["site-mirror", "http://example.com/docs", "/tmp/out"]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.src.as_str(), "http://example.com/docs/");
        assert_eq!(config.idle_threshold, 3);
        assert_eq!(config.idle_backoff, Duration::from_secs(30));
        assert_eq!(config.termination, Termination::IdleStreak);
        assert!(!config.force_download);
    }

    #[test]
    fn test_repeated_exclude_file() {
        let cli = Cli::parse_from([
            "site-mirror",
            "http://example.com/",
            "/tmp/out",
            "--exclude-file",
            "index.html",
            "--exclude-file",
            "robots.txt",
            "--termination",
            "quiescent",
            "--num-downloaders",
            "4",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.exclude_files.len(), 2);
        assert!(config.exclude_files.contains("robots.txt"));
        assert_eq!(config.termination, Termination::Quiescent);
        assert_eq!(config.num_downloaders, 4);
    }

    #[test]
    fn test_zero_downloaders_rejected() {
        let cli = Cli::parse_from([
            "site-mirror",
            "http://example.com/",
            "/tmp/out",
            "--num-downloaders",
            "0",
        ]);
        assert!(cli.into_config().is_err());
    }
}
