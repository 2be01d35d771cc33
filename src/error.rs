// src/error.rs
// =============================================================================
// Error types for the mirror engine.
//
// Not every error is equal here:
// - Network and parse problems only affect ONE page. We log them and move on.
// - Filesystem problems (can't create a directory, can't write a file) mean
//   the destination is broken. There's no point mirroring a site we can't
//   save, so those stop the whole run.
//
// MirrorError::is_fatal() is how a worker tells the two apart.
//
// Rust concepts:
// - thiserror: derives std::error::Error + Display from attributes
// - #[from]: lets the ? operator convert the inner error automatically
// =============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while mirroring a single page
#[derive(Debug, Error)]
pub enum MirrorError {
    /// GET/HEAD failed at the transport level (DNS, connect, timeout, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered, but not with a 2xx
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The URL can't be turned into a file under the destination root
    #[error(transparent)]
    Path(#[from] PathError),

    /// Reading the page (network body or cached file) failed midway
    #[error("failed to read {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Stat/open of an existing local copy failed for a reason other than "missing"
    #[error("failed to inspect local copy {}: {source}", .path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTML scanner gave up on the page
    #[error("link extraction failed: {0}")]
    Extract(String),

    /// A downloader task panicked
    #[error("downloader task failed: {0}")]
    Worker(String),

    /// Directory creation, file creation or a write to the mirror failed
    #[error("failed to persist {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    /// Persist failures and crashed downloaders end the run; everything else
    /// only costs one page
    pub fn is_fatal(&self) -> bool {
        matches!(self, MirrorError::Persist { .. } | MirrorError::Worker(_))
    }
}

/// Problems mapping a URL path onto the destination directory
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("{path} is not under the mirror root {root}")]
    OutsideRoot { path: String, root: String },
}

/// Invalid command-line configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("--num-downloaders must be at least 1")]
    NoDownloaders,

    #[error("--idle-threshold must be at least 1")]
    ZeroIdleThreshold,

    #[error("--stats-interval-secs must be at least 1")]
    ZeroStatsInterval,

    #[error("cannot use destination {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persist_errors_are_fatal() {
        let persist = MirrorError::Persist {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(persist.is_fatal());

        let status = MirrorError::Status {
            url: "http://example.com/".to_string(),
            status: 404,
        };
        assert!(!status.is_fatal());

        let outside = MirrorError::from(PathError::OutsideRoot {
            path: "/documents".to_string(),
            root: "/doc".to_string(),
        });
        assert!(!outside.is_fatal());
    }
}
