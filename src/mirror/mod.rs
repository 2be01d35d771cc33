// src/mirror/mod.rs
// =============================================================================
// This module mirrors a website to disk.
//
// Submodules, leaf first:
// - paths:    URL -> local file path, path cleaning, scope test
// - links:    <a href>/<img src> extraction and resolution
// - fetch:    GET vs HEAD vs "use the file we already have"
// - store:    tee the page to disk while collecting it for extraction
// - frontier: shared work queue + claimed-path set
// - worker:   the downloader loop and its termination rules
//
// mirror_site() below wires them together: seed the frontier with the root
// URL, start the workers and the stats collector, wait for every worker to
// finish, and report what happened.
// =============================================================================

mod fetch;
mod frontier;
mod links;
mod paths;
mod store;
mod worker;

use crate::config::Config;
use crate::error::MirrorError;
use crate::stats::{StatsCollector, WorkerStats};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use worker::Crawler;

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    /// Distinct paths claimed by the workers
    pub claimed: usize,
    pub pages: u64,
    pub gets: u64,
    pub heads: u64,
    pub workers: Vec<WorkerStats>,
}

impl CrawlReport {
    fn new(claimed: usize, workers: Vec<WorkerStats>) -> Self {
        CrawlReport {
            claimed,
            pages: workers.iter().map(|w| w.pages).sum(),
            gets: workers.iter().map(|w| w.gets).sum(),
            heads: workers.iter().map(|w| w.heads).sum(),
            workers,
        }
    }
}

// Mirrors config.src into config.dst
//
// Returns once every worker has stopped. The first fatal error stops the
// remaining workers and is returned.
pub async fn mirror_site(config: Config) -> Result<CrawlReport, MirrorError> {
    let num_downloaders = config.num_downloaders;
    let crawler = Arc::new(Crawler::new(config)?);
    crawler.frontier.push(vec![crawler.config.src.clone()]);

    let (stats, collector) = StatsCollector::spawn(crawler.config.stats_interval);

    info!(
        downloaders = num_downloaders,
        src = %crawler.config.src,
        root = crawler.mapper.root_path(),
        "spawning downloaders"
    );
    let mut workers = JoinSet::new();
    for id in 0..num_downloaders {
        workers.spawn(worker::run_worker(Arc::clone(&crawler), stats.recorder(id)));
    }
    // The workers hold the only senders now; the collector ends with them
    drop(stats);

    let mut outcome = Ok(());
    while let Some(joined) = workers.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => MirrorError::Worker(e.to_string()),
        };

        if outcome.is_ok() {
            error!(error = %failure, "fatal error, stopping all downloaders");
            workers.abort_all();
            outcome = Err(failure);
        }
    }

    let per_worker = collector.finish().await;
    outcome?;

    let report = CrawlReport::new(crawler.frontier.claimed_count(), per_worker);
    info!(pages = report.pages, gets = report.gets, heads = report.heads, "mirror complete");
    Ok(report)
}
