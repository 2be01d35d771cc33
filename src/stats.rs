// src/stats.rs
// =============================================================================
// Per-worker counters, owned by a single task.
//
// Workers never touch the counters directly. They send a tiny StatEvent
// over a channel, and one collector task applies it. No locks, no atomics,
// and no contention on the hot path shared by every worker.
//
// Every `interval` the collector logs a snapshot. When the last sender is
// dropped (all workers done) it hands back the final numbers for the report.
//
// Nothing in the crawl ever reads these counters to make a decision; they
// are purely for humans.
// =============================================================================

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

// Small buffer: workers wait briefly if the collector falls behind, which
// it won't, since applying an event is a map lookup
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    Page(usize),
    Get(usize),
    Head(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker: usize,
    /// Pages claimed and run through the fetcher
    pub pages: u64,
    /// GET requests issued
    pub gets: u64,
    /// HEAD requests issued
    pub heads: u64,
}

// Sending half; hands out one Recorder per worker
pub struct Stats {
    tx: mpsc::Sender<StatEvent>,
}

impl Stats {
    pub fn recorder(&self, worker: usize) -> Recorder {
        Recorder {
            tx: self.tx.clone(),
            worker,
        }
    }
}

// A worker's own handle: knows its id so call sites stay short
pub struct Recorder {
    tx: mpsc::Sender<StatEvent>,
    worker: usize,
}

impl Recorder {
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub async fn page(&self) {
        self.send(StatEvent::Page(self.worker)).await;
    }

    pub async fn get(&self) {
        self.send(StatEvent::Get(self.worker)).await;
    }

    pub async fn head(&self) {
        self.send(StatEvent::Head(self.worker)).await;
    }

    async fn send(&self, event: StatEvent) {
        // The collector only goes away after every sender is dropped, so a
        // failed send can only happen during shutdown; the count is moot then
        let _ = self.tx.send(event).await;
    }
}

pub struct StatsCollector {
    handle: JoinHandle<Vec<WorkerStats>>,
}

impl StatsCollector {
    // Starts the collector task and returns the sending half
    pub fn spawn(interval: Duration) -> (Stats, StatsCollector) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(collect(rx, interval));
        (Stats { tx }, StatsCollector { handle })
    }

    // Waits for every sender to be dropped and returns the final counters,
    // ordered by worker id
    pub async fn finish(self) -> Vec<WorkerStats> {
        self.handle.await.unwrap_or_default()
    }
}

async fn collect(mut rx: mpsc::Receiver<StatEvent>, interval: Duration) -> Vec<WorkerStats> {
    let mut counters: BTreeMap<usize, WorkerStats> = BTreeMap::new();

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first snapshot
    // comes after one full interval
    tick.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => apply(&mut counters, event),
                None => break,
            },
            _ = tick.tick() => log_snapshot(&counters),
        }
    }

    counters.into_values().collect()
}

fn apply(counters: &mut BTreeMap<usize, WorkerStats>, event: StatEvent) {
    let worker = match event {
        StatEvent::Page(w) | StatEvent::Get(w) | StatEvent::Head(w) => w,
    };

    let stats = counters.entry(worker).or_insert_with(|| WorkerStats {
        worker,
        ..WorkerStats::default()
    });

    match event {
        StatEvent::Page(_) => stats.pages += 1,
        StatEvent::Get(_) => stats.gets += 1,
        StatEvent::Head(_) => stats.heads += 1,
    }
}

fn log_snapshot(counters: &BTreeMap<usize, WorkerStats>) {
    info!(workers = counters.len(), "stats snapshot");
    for stats in counters.values() {
        info!(
            worker = stats.worker,
            pages = stats.pages,
            gets = stats.gets,
            heads = stats.heads,
            "stats"
        );
    }
}
