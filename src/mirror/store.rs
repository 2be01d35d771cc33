// src/mirror/store.rs
// =============================================================================
// Reads a fetched page once, saving it to disk and scanning it for links
// at the same time.
//
// Each chunk read from the body is:
//   1. written to the mirror file (if this result must be stored), then
//   2. kept for the link extractor (if the page is HTML)
//
// Non-HTML content (images, PDFs, ...) is still read to the end so the file
// gets completely written and the connection is freed, but nothing is
// extracted from it.
//
// Failing to create a directory or to write the file is fatal (see
// MirrorError::is_fatal). A read error only abandons this page.
// =============================================================================

use crate::config::Config;
use crate::error::MirrorError;
use crate::mirror::fetch::FetchResult;
use crate::mirror::links;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

// Persists (if needed) and scans a fetched page
//
// Returns the raw href/src values found, or an empty list for non-HTML
pub async fn store_and_scan(mut fetched: FetchResult, config: &Config) -> Result<Vec<String>, MirrorError> {
    let mut sink = if !fetched.store {
        None
    } else if config.is_excluded(&fetched.file_path) {
        info!(path = %fetched.file_path.display(), "excluded, not storing");
        None
    } else {
        info!(
            path = %fetched.file_path.display(),
            decision = ?fetched.decision,
            last_modified = fetched.last_modified.as_deref().unwrap_or("-"),
            "storing"
        );
        Some(create_file(&fetched.file_path).await?)
    };

    let is_html = fetched.is_html();
    let mut html = Vec::new();
    let mut read: u64 = 0;

    loop {
        let chunk = fetched
            .body
            .next_chunk()
            .await
            .map_err(|source| MirrorError::Read {
                url: fetched.final_url.to_string(),
                source,
            })?;
        let Some(chunk) = chunk else { break };
        read += chunk.len() as u64;

        if let Some(file) = sink.as_mut() {
            file.write_all(&chunk)
                .await
                .map_err(|source| persist_error(&fetched.file_path, source))?;
        }
        if is_html {
            html.extend_from_slice(&chunk);
        }
    }

    if let Some(mut file) = sink {
        file.flush()
            .await
            .map_err(|source| persist_error(&fetched.file_path, source))?;

        // A short body leaves a file whose size won't match on the next
        // run, so the page is simply downloaded again then
        if let Some(declared) = fetched.content_length.filter(|&n| n != read) {
            warn!(path = %fetched.file_path.display(), declared, read, "body length differs from Content-Length");
        }
    }

    if !is_html {
        return Ok(Vec::new());
    }

    links::extract_links(&html)
}

// Creates (or truncates) the mirror file, making parent directories first
//
// create_dir_all succeeds if the directory already exists, so two workers
// racing to create the same directory both carry on.
async fn create_file(path: &Path) -> Result<File, MirrorError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| persist_error(dir, source))?;
    }

    File::create(path)
        .await
        .map_err(|source| persist_error(path, source))
}

fn persist_error(path: &Path, source: std::io::Error) -> MirrorError {
    MirrorError::Persist {
        path: path.to_path_buf(),
        source,
    }
}
