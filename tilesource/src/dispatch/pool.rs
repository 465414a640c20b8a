//! Fixed pool of worker actors.
//!
//! Workers start asynchronously. The pool reports ready once every worker
//! task is running; until then the coordinator takes the inline-fetch path.

use super::actor::{Actor, ActorId, Dispatcher};
use super::decoder::TileDecoder;
use super::worker::{Worker, WorkerContext};
use crate::fetch::ResourceFetcher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default mailbox capacity per worker.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 16;

/// Default number of workers: available parallelism, clamped to 1..=16.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_WORKERS)
}

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker actors
    pub workers: usize,
    /// Mailbox capacity per worker
    pub channel_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

struct Readiness {
    started: AtomicUsize,
    expected: usize,
    notify: Notify,
}

/// Pool of worker actors handed out round-robin.
///
/// Must be created inside a tokio runtime. Dropping the pool stops every
/// worker.
pub struct WorkerPool {
    actors: Vec<Actor>,
    next: AtomicUsize,
    readiness: Arc<Readiness>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawns `config.workers` worker tasks.
    pub fn spawn(
        config: WorkerPoolConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        let count = config.workers.max(1);
        let context = WorkerContext { fetcher, decoder };
        let shutdown = CancellationToken::new();
        let readiness = Arc::new(Readiness {
            started: AtomicUsize::new(0),
            expected: count,
            notify: Notify::new(),
        });

        let actors = (0..count)
            .map(|index| {
                let id = ActorId(index);
                let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
                let worker = Worker::new(id, context.clone());
                let readiness = Arc::clone(&readiness);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let started = readiness.started.fetch_add(1, Ordering::SeqCst) + 1;
                    if started == readiness.expected {
                        readiness.notify.notify_waiters();
                    }
                    worker.run(rx, shutdown).await;
                });
                Actor::new(id, tx)
            })
            .collect();

        info!(
            workers = count,
            channel_capacity = config.channel_capacity,
            "Worker pool spawned"
        );

        Self {
            actors,
            next: AtomicUsize::new(0),
            readiness,
            shutdown,
        }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.actors.len()
    }

    /// Waits until every worker task is running.
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.readiness.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    /// Stops all workers. In-flight loads are cancelled.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(workers = self.actors.len(), "Shutting down worker pool");
            self.shutdown.cancel();
        }
    }
}

impl Dispatcher for WorkerPool {
    fn is_ready(&self) -> bool {
        !self.shutdown.is_cancelled()
            && self.readiness.started.load(Ordering::SeqCst) >= self.readiness.expected
    }

    fn get_actor(&self) -> Actor {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.actors.len();
        self.actors[index].clone()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
