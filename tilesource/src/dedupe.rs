//! Deduplication of concurrent raw fetches.
//!
//! When several callers request the same URL while a fetch for it is in
//! flight, only one network request runs and every waiter receives the same
//! result.
//!
//! # Architecture
//!
//! ```text
//! Tile A (url U) ─┐
//!                 │                           ResourceFetcher
//! Tile B (url U) ─┼──► DedupeTable ─────────► (one fetch for U)
//!                 │        │                        │
//! Tile C (url U) ─┘        │                        │
//!                          ▼                        ▼
//!                    [A, B, C each            [one result]
//!                     receive it once]◄─────────────┘
//! ```
//!
//! # Cancellation
//!
//! Dropping a [`DedupeWaiter`] removes only that waiter. The underlying fetch
//! is cancelled when its last waiter leaves. A waiter dropped after the
//! result was already sent simply never reads it.

use crate::error::SourceError;
use crate::fetch::FetchedResource;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result shared by every waiter of one fetch.
pub type DedupeResult = Result<FetchedResource, SourceError>;

/// One in-flight fetch and the waiters interested in it.
struct InFlight {
    fetch_id: u64,
    waiters: HashMap<u64, oneshot::Sender<DedupeResult>>,
    cancel: CancellationToken,
}

struct Shared {
    in_flight: DashMap<String, InFlight>,
    next_id: AtomicU64,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
    cancelled_fetches: AtomicU64,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn complete(&self, key: &str, fetch_id: u64, result: DedupeResult) {
        let Some((_, entry)) = self
            .in_flight
            .remove_if(key, |_, entry| entry.fetch_id == fetch_id)
        else {
            return;
        };

        let waiters = entry.waiters.len();
        for (_, tx) in entry.waiters {
            let _ = tx.send(result.clone());
        }
        debug!(
            key = key,
            waiters = waiters,
            ok = result.is_ok(),
            "Delivered deduplicated fetch result"
        );
    }

    fn remove_waiter(&self, key: &str, waiter_id: u64) {
        let mut emptied = None;
        if let Some(mut entry) = self.in_flight.get_mut(key) {
            if entry.waiters.remove(&waiter_id).is_some() && entry.waiters.is_empty() {
                emptied = Some(entry.fetch_id);
            }
        }

        let Some(fetch_id) = emptied else {
            return;
        };
        if let Some((_, entry)) = self.in_flight.remove_if(key, |_, entry| {
            entry.fetch_id == fetch_id && entry.waiters.is_empty()
        }) {
            entry.cancel.cancel();
            self.cancelled_fetches.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Last waiter left - cancelled fetch");
        }
    }
}

/// Releases the waiters of a fetch task that ends without a result
/// (panicked fetch, aborted task or runtime shutdown).
struct CompletionGuard {
    shared: Arc<Shared>,
    key: String,
    fetch_id: u64,
    armed: bool,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(key = %self.key, "Fetch task ended without a result");
            self.shared.complete(
                &self.key,
                self.fetch_id,
                Err(SourceError::Worker(format!(
                    "fetch for {} ended without a result",
                    self.key
                ))),
            );
        }
    }
}

/// Statistics for monitoring deduplication effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupeStats {
    /// Total requests received
    pub total_requests: u64,
    /// Requests that joined an existing fetch
    pub coalesced_requests: u64,
    /// Requests that started a fetch
    pub new_requests: u64,
    /// Fetches cancelled because every waiter left
    pub cancelled_fetches: u64,
}

impl DedupeStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Table of in-flight fetches keyed by request URL.
///
/// Cloning is cheap and all clones share one table, so a single table can
/// serve every source in the process.
#[derive(Clone)]
pub struct DedupeTable {
    shared: Arc<Shared>,
}

impl DedupeTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                in_flight: DashMap::new(),
                next_id: AtomicU64::new(1),
                total_requests: AtomicU64::new(0),
                coalesced_requests: AtomicU64::new(0),
                new_requests: AtomicU64::new(0),
                cancelled_fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Registers interest in `key`.
    ///
    /// If no fetch for `key` is in flight, `fetch` is called and its future
    /// spawned on the runtime. Otherwise `fetch` is dropped unused and the
    /// caller joins the running fetch.
    pub fn request<F, Fut>(&self, key: &str, fetch: F) -> DedupeWaiter
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DedupeResult> + Send + 'static,
    {
        let shared = &self.shared;
        shared.total_requests.fetch_add(1, Ordering::Relaxed);

        let waiter_id = shared.next_id();
        let (tx, rx) = oneshot::channel();

        match shared.in_flight.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.insert(waiter_id, tx);
                shared.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = key,
                    waiters = entry.get().waiters.len(),
                    "Joining in-flight fetch"
                );
            }
            Entry::Vacant(entry) => {
                let fetch_id = shared.next_id();
                let cancel = CancellationToken::new();
                let mut waiters = HashMap::new();
                waiters.insert(waiter_id, tx);
                entry.insert(InFlight {
                    fetch_id,
                    waiters,
                    cancel: cancel.clone(),
                });
                shared.new_requests.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Starting deduplicated fetch");

                let future = fetch();
                let task_shared = Arc::clone(shared);
                let task_key = key.to_string();
                tokio::spawn(async move {
                    let mut guard = CompletionGuard {
                        shared: task_shared,
                        key: task_key,
                        fetch_id,
                        armed: true,
                    };
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            guard.armed = false;
                            return;
                        }
                        result = future => result,
                    };
                    guard.armed = false;
                    guard.shared.complete(&guard.key, fetch_id, result);
                });
            }
        }

        DedupeWaiter {
            key: key.to_string(),
            waiter_id,
            shared: Arc::clone(shared),
            rx,
            delivered: false,
        }
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> DedupeStats {
        DedupeStats {
            total_requests: self.shared.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.shared.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.shared.new_requests.load(Ordering::Relaxed),
            cancelled_fetches: self.shared.cancelled_fetches.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Returns the number of waiters for `key`, 0 if nothing is in flight.
    pub fn waiter_count(&self, key: &str) -> usize {
        self.shared
            .in_flight
            .get(key)
            .map(|entry| entry.waiters.len())
            .unwrap_or(0)
    }

    /// Logs current statistics.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            cancelled = stats.cancelled_fetches,
            in_flight = self.in_flight_count(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Fetch deduplication statistics"
        );
    }
}

impl Default for DedupeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One caller's interest in a deduplicated fetch.
///
/// Dropping the waiter before it resolves withdraws that interest.
pub struct DedupeWaiter {
    key: String,
    waiter_id: u64,
    shared: Arc<Shared>,
    rx: oneshot::Receiver<DedupeResult>,
    delivered: bool,
}

impl DedupeWaiter {
    /// The key this waiter is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the shared result.
    pub async fn wait(mut self) -> DedupeResult {
        let result = (&mut self.rx).await;
        self.delivered = true;
        result.unwrap_or(Err(SourceError::Cancelled))
    }

    /// Withdraws this waiter. Other waiters are unaffected.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for DedupeWaiter {
    fn drop(&mut self) {
        if !self.delivered {
            self.shared.remove_waiter(&self.key, self.waiter_id);
        }
    }
}
