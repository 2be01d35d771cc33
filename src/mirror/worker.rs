// src/mirror/worker.rs
// =============================================================================
// The downloaders.
//
// Every worker runs the same loop against the shared frontier:
//
//   pop a URL
//   ├─ nothing there: count an idle poll; after `idle_threshold` in a row,
//   │                 stop for good, otherwise sleep `idle_backoff` and retry
//   └─ got one:       reset the idle count, claim its path (skip if another
//                     worker already has it), fetch, store, extract links,
//                     push the in-scope links back onto the frontier
//
// No one tells the workers that the crawl is over. Each one decides on its
// own once it keeps finding nothing to do; when the last one stops, the
// pool's join completes. With Termination::Quiescent the frontier instead
// tells a waiting worker when nothing is queued and nothing is in flight.
//
// A page failing (network, bad HTML, 404) is logged and skipped. A fatal
// error (can't write to the mirror) is returned and stops the whole pool.
// =============================================================================

use crate::config::{Config, Termination};
use crate::error::MirrorError;
use crate::mirror::fetch::Fetcher;
use crate::mirror::frontier::{Frontier, InFlight};
use crate::mirror::links;
use crate::mirror::paths::{clean_path, PathMapper};
use crate::mirror::store;
use crate::stats::Recorder;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

// Everything the workers share, built once per run
pub struct Crawler {
    pub config: Config,
    pub frontier: Frontier,
    pub mapper: PathMapper,
    pub fetcher: Fetcher,
}

impl Crawler {
    pub fn new(config: Config) -> Result<Self, MirrorError> {
        let mapper = PathMapper::new(&config.src, &config.dst);
        let fetcher = Fetcher::new(&config, mapper.clone())?;
        Ok(Crawler {
            config,
            frontier: Frontier::new(),
            mapper,
            fetcher,
        })
    }
}

// One worker, until it decides the crawl is finished or hits a fatal error
pub async fn run_worker(crawler: Arc<Crawler>, stats: Recorder) -> Result<(), MirrorError> {
    info!(worker = stats.worker(), "downloader started");
    let result = match crawler.config.termination {
        Termination::IdleStreak => idle_streak_loop(&crawler, &stats).await,
        Termination::Quiescent => quiescent_loop(&crawler, &stats).await,
    };
    info!(worker = stats.worker(), "downloader stopped");
    result
}

async fn idle_streak_loop(crawler: &Crawler, stats: &Recorder) -> Result<(), MirrorError> {
    let mut idle_streak = 0;

    loop {
        let Some(url) = crawler.frontier.pop() else {
            idle_streak += 1;
            if idle_streak >= crawler.config.idle_threshold {
                debug!(worker = stats.worker(), idle_streak, "frontier stayed empty, giving up");
                return Ok(());
            }
            debug!(worker = stats.worker(), idle_streak, "frontier empty, backing off");
            tokio::time::sleep(crawler.config.idle_backoff).await;
            continue;
        };

        idle_streak = 0;
        let _in_flight = InFlight::new(&crawler.frontier);
        handle_page(crawler, url, stats).await?;
    }
}

async fn quiescent_loop(crawler: &Crawler, stats: &Recorder) -> Result<(), MirrorError> {
    while let Some(url) = crawler.frontier.next_or_drained().await {
        let _in_flight = InFlight::new(&crawler.frontier);
        handle_page(crawler, url, stats).await?;
    }
    debug!(worker = stats.worker(), "frontier drained");
    Ok(())
}

// Runs one page and sorts its failures into "log it" and "stop everything"
async fn handle_page(crawler: &Crawler, url: Url, stats: &Recorder) -> Result<(), MirrorError> {
    match process_page(crawler, &url, stats).await {
        Ok(found) => {
            crawler.frontier.push(found);
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(worker = stats.worker(), url = %url, error = %e, "abandoning page");
            Ok(())
        }
    }
}

// Claims, fetches, stores and scans one page
//
// Returns the in-scope links found on it (possibly none). Pages another
// worker already claimed return no links and cost no request.
pub async fn process_page(
    crawler: &Crawler,
    url: &Url,
    stats: &Recorder,
) -> Result<Vec<Url>, MirrorError> {
    let key = clean_path(url.path());
    if !crawler.frontier.claim(&key) {
        debug!(worker = stats.worker(), path = %key, "already claimed");
        return Ok(Vec::new());
    }

    info!(worker = stats.worker(), url = %url, queued = crawler.frontier.len(), "processing");
    stats.page().await;

    let fetched = crawler.fetcher.fetch(url, stats).await?;
    // Redirects move the page; relative links resolve against where it landed
    let page_url = fetched.final_url.clone();
    let raw = store::store_and_scan(fetched, &crawler.config).await?;

    Ok(links::resolve_links(&page_url, raw, &crawler.mapper))
}
