// src/mirror/frontier.rs
// =============================================================================
// The shared to-do list of the crawl, plus the "who owns which page" set.
//
// Every worker holds an Arc<Frontier>. Two pieces of state live here:
//
// - queue:   URLs waiting to be processed. Unbounded, never drops anything.
//            New links go to the FRONT, so a worker tends to dig into the
//            pages it just found (depth-first bias).
// - claimed: normalized paths some worker already took. The same URL may be
//            pushed many times; only the first claim() wins.
//
// Dedup happens at claim time instead of push time, which keeps push() as a
// plain list insert.
//
// The locks are std::sync::Mutex on purpose: critical sections are a few
// list operations and never contain an .await.
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

pub struct Frontier {
    queue: Mutex<Queue>,
    claimed: Mutex<HashSet<String>>,
    // Wakes workers waiting in next_or_drained()
    changed: Notify,
}

#[derive(Default)]
struct Queue {
    urls: VecDeque<Url>,
    // Popped but not yet finished
    in_flight: usize,
}

impl Frontier {
    pub fn new() -> Self {
        Frontier {
            queue: Mutex::new(Queue::default()),
            claimed: Mutex::new(HashSet::new()),
            changed: Notify::new(),
        }
    }

    // Marks a normalized path as taken
    //
    // Returns true only for the first caller with a given path, across all
    // workers and for the lifetime of the frontier.
    pub fn claim(&self, path: &str) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(path) {
            return false;
        }
        claimed.insert(path.to_string())
    }

    // Adds a batch of URLs ahead of everything already queued
    //
    // No dedup here. Each URL is pushed to the front in turn, so the last
    // URL of the batch is popped first.
    pub fn push(&self, urls: Vec<Url>) {
        if urls.is_empty() {
            return;
        }
        {
            let mut queue = self.lock_queue();
            for url in urls {
                queue.urls.push_front(url);
            }
        }
        self.changed.notify_waiters();
    }

    // Takes the next URL without waiting
    //
    // None only means "empty right now": another worker may be about to push.
    // A returned URL counts as in flight until finish() is called for it.
    pub fn pop(&self) -> Option<Url> {
        let mut queue = self.lock_queue();
        let url = queue.urls.pop_front()?;
        queue.in_flight += 1;
        Some(url)
    }

    // Reports that a URL returned by pop() has been fully handled
    pub fn finish(&self) {
        {
            let mut queue = self.lock_queue();
            queue.in_flight = queue.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    // Waits for work; returns None once the queue is empty AND nothing is in
    // flight anywhere (no one can push more work)
    pub async fn next_or_drained(&self) -> Option<Url> {
        loop {
            // Created before checking so a push/finish in between isn't missed
            let changed = self.changed.notified();

            {
                let mut queue = self.lock_queue();
                if let Some(url) = queue.urls.pop_front() {
                    queue.in_flight += 1;
                    return Some(url);
                }
                if queue.in_flight == 0 {
                    return None;
                }
            }

            changed.await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock_queue().urls.len()
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Calls Frontier::finish() when dropped, so every exit path of a worker
// iteration (early return, ?, error) releases its in-flight slot
pub struct InFlight<'a> {
    frontier: &'a Frontier,
}

impl<'a> InFlight<'a> {
    pub fn new(frontier: &'a Frontier) -> Self {
        InFlight { frontier }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.frontier.finish();
    }
}
