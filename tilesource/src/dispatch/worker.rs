//! Worker actor: the execution context behind an [`Actor`](super::Actor).
//!
//! Each worker drains its mailbox and runs one task per tile load. Tile
//! state is keyed by `(source, uid)`:
//!
//! - `loading`: cancellation token of every in-flight load
//! - `loaded`: raw response and params of finished loads, kept so that
//!   `ReloadTile` can re-decode without refetching
//!
//! `AbortTile` cancels a load; `RemoveTile` cancels it and drops the
//! retained bytes.

use super::actor::ActorId;
use super::decoder::TileDecoder;
use super::message::{
    Envelope, ResourceTiming, TileParams, WorkerMessage, WorkerReply, WorkerTileResult,
};
use crate::error::SourceError;
use crate::fetch::{FetchedResource, ResourceFetcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type TileKey = (String, u64);

struct LoadedTile {
    raw: FetchedResource,
}

#[derive(Default)]
struct WorkerState {
    loading: HashMap<TileKey, CancellationToken>,
    loaded: HashMap<TileKey, LoadedTile>,
}

/// Shared collaborators of every worker in a pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub decoder: Arc<dyn TileDecoder>,
}

/// One worker's mailbox loop.
pub(crate) struct Worker {
    id: ActorId,
    context: WorkerContext,
    state: Arc<Mutex<WorkerState>>,
}

impl Worker {
    pub(crate) fn new(id: ActorId, context: WorkerContext) -> Self {
        Self {
            id,
            context,
            state: Arc::new(Mutex::new(WorkerState::default())),
        }
    }

    /// Processes messages until the mailbox closes or `shutdown` fires.
    pub(crate) async fn run(self, mut rx: mpsc::Receiver<Envelope>, shutdown: CancellationToken) {
        debug!(worker = %self.id, "Worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                envelope = rx.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => break,
                },
            }
        }

        // Outstanding loads would otherwise outlive the pool
        let state = self.state.lock();
        for token in state.loading.values() {
            token.cancel();
        }
        debug!(
            worker = %self.id,
            loading = state.loading.len(),
            loaded = state.loaded.len(),
            "Worker stopped"
        );
    }

    fn handle(&self, envelope: Envelope) {
        let (message, reply) = envelope.into_parts();
        trace!(worker = %self.id, message = %message, "Worker received message");

        match message {
            WorkerMessage::LoadTile(params) => self.load(*params, reply),
            WorkerMessage::ReloadTile(params) => self.reload(*params, reply),
            WorkerMessage::AbortTile { source, uid } => {
                let key = (source, uid);
                if let Some(token) = self.state.lock().loading.remove(&key) {
                    token.cancel();
                    debug!(worker = %self.id, source = %key.0, uid = uid, "Aborted tile load");
                }
                respond(reply, Ok(None));
            }
            WorkerMessage::RemoveTile { source, uid } => {
                let key = (source, uid);
                let mut state = self.state.lock();
                if let Some(token) = state.loading.remove(&key) {
                    token.cancel();
                }
                state.loaded.remove(&key);
                drop(state);
                respond(reply, Ok(None));
            }
        }
    }

    fn load(&self, params: TileParams, reply: Option<oneshot::Sender<WorkerReply>>) {
        let key = (params.source.clone(), params.uid);
        let token = CancellationToken::new();
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.loading.insert(key.clone(), token.clone()) {
                previous.cancel();
            }
        }

        let context = self.context.clone();
        let state = Arc::clone(&self.state);
        let id = self.id;
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = fetch_and_decode(&context, params) => Some(outcome),
            };

            let Some((result, raw)) = outcome else {
                // Dropping `reply` tells the requester the load was aborted
                trace!(worker = %id, uid = key.1, "Tile load cancelled");
                return;
            };

            {
                let mut state = state.lock();
                if token.is_cancelled() {
                    return;
                }
                state.loading.remove(&key);
                if let (Ok(_), Some(raw)) = (&result, raw) {
                    state.loaded.insert(key.clone(), LoadedTile { raw });
                }
            }
            if let Err(e) = &result {
                debug!(worker = %id, uid = key.1, error = %e, "Tile load failed");
            }
            respond(reply, result);
        });
    }

    /// Re-decodes retained bytes, or falls back to a full load when this
    /// worker holds nothing for the tile.
    fn reload(&self, mut params: TileParams, reply: Option<oneshot::Sender<WorkerReply>>) {
        let key = (params.source.clone(), params.uid);
        params.data = self
            .state
            .lock()
            .loaded
            .get(&key)
            .map(|loaded| loaded.raw.clone());
        trace!(
            worker = %self.id,
            uid = params.uid,
            retained = params.data.is_some(),
            "Reloading tile"
        );
        self.load(params, reply);
    }
}

fn respond(reply: Option<oneshot::Sender<WorkerReply>>, result: WorkerReply) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

/// Fetches (unless bytes were supplied) and decodes a tile.
///
/// Returns the reply plus the raw resource to retain for reloads.
async fn fetch_and_decode(
    context: &WorkerContext,
    mut params: TileParams,
) -> (WorkerReply, Option<FetchedResource>) {
    let raw = match params.data.take() {
        Some(raw) => raw,
        None => match context.fetcher.fetch(&params.request).await {
            Ok(raw) => raw,
            Err(e) => return (Err(e), None),
        },
    };

    let decoder = Arc::clone(&context.decoder);
    let data = raw.data.clone();
    let collect_timing = params.collect_resource_timing;
    let decoded = tokio::task::spawn_blocking(move || decoder.decode(&data, &params)).await;

    let reply = match decoded {
        Ok(Ok(Some(decoded))) => Ok(Some(WorkerTileResult {
            decoded,
            expiry: raw.expiry.clone(),
            resource_timing: collect_timing.then(|| ResourceTiming {
                url: raw.url.clone(),
                duration: raw.elapsed,
            }),
        })),
        Ok(Ok(None)) => Ok(None),
        Ok(Err(e)) => Err(e),
        Err(join_error) => {
            warn!(url = %raw.url, error = %join_error, "Decode task failed");
            Err(SourceError::Worker(format!("decode task failed: {}", join_error)))
        }
    };
    (reply, Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::decoder::tests::params;
    use crate::dispatch::decoder::PassthroughDecoder;
    use crate::dispatch::Actor;
    use crate::fetch::MockFetcher;
    use std::time::Duration;

    const URL: &str = "https://t.example.com/3/1/2.pbf";

    fn spawn_worker(fetcher: Arc<MockFetcher>) -> (Actor, CancellationToken) {
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let worker = Worker::new(
            ActorId(0),
            WorkerContext {
                fetcher,
                decoder: Arc::new(PassthroughDecoder),
            },
        );
        tokio::spawn(worker.run(rx, shutdown.clone()));
        (Actor::new(ActorId(0), tx), shutdown)
    }

    #[tokio::test]
    async fn test_load_fetches_and_decodes() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_bytes(URL, b"tile-bytes");
        let (actor, _shutdown) = spawn_worker(Arc::clone(&fetcher));

        let result = actor
            .request(WorkerMessage::LoadTile(Box::new(params())))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&result.decoded.data[..], b"tile-bytes");
        assert!(result.resource_timing.is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_supplied_bytes_skip_fetch() {
        let fetcher = Arc::new(MockFetcher::new());
        let (actor, _shutdown) = spawn_worker(Arc::clone(&fetcher));

        let mut params = params();
        params.data = Some(FetchedResource::new(URL, b"inline".to_vec()));
        params.collect_resource_timing = true;
        let result = actor
            .request(WorkerMessage::LoadTile(Box::new(params)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&result.decoded.data[..], b"inline");
        assert_eq!(result.resource_timing.unwrap().url, URL);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reload_reuses_retained_bytes() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_bytes(URL, b"tile-bytes");
        let (actor, _shutdown) = spawn_worker(Arc::clone(&fetcher));

        actor
            .request(WorkerMessage::LoadTile(Box::new(params())))
            .await
            .unwrap();
        let reloaded = actor
            .request(WorkerMessage::ReloadTile(Box::new(params())))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&reloaded.decoded.data[..], b"tile-bytes");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_after_remove_refetches() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_bytes(URL, b"tile-bytes");
        let (actor, _shutdown) = spawn_worker(Arc::clone(&fetcher));

        actor
            .request(WorkerMessage::LoadTile(Box::new(params())))
            .await
            .unwrap();
        actor
            .request(WorkerMessage::RemoveTile {
                source: "streets".to_string(),
                uid: 7,
            })
            .await
            .unwrap();
        actor
            .request(WorkerMessage::ReloadTile(Box::new(params())))
            .await
            .unwrap();

        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_abort_drops_reply() {
        let fetcher = Arc::new(MockFetcher::gated());
        fetcher.respond_bytes(URL, b"tile-bytes");
        let (actor, _shutdown) = spawn_worker(Arc::clone(&fetcher));

        let loading = {
            let actor = actor.clone();
            tokio::spawn(async move {
                actor
                    .request(WorkerMessage::LoadTile(Box::new(params())))
                    .await
            })
        };
        while fetcher.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        actor.notify(WorkerMessage::AbortTile {
            source: "streets".to_string(),
            uid: 7,
        });

        assert_eq!(loading.await.unwrap(), Err(SourceError::Cancelled));
    }

    #[tokio::test]
    async fn test_fetch_error_is_replied() {
        let fetcher = Arc::new(MockFetcher::new());
        let (actor, _shutdown) = spawn_worker(fetcher);

        let err = actor
            .request(WorkerMessage::LoadTile(Box::new(params())))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailbox() {
        let fetcher = Arc::new(MockFetcher::new());
        let (actor, shutdown) = spawn_worker(fetcher);

        shutdown.cancel();
        while !actor.is_closed() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(actor.request(WorkerMessage::LoadTile(Box::new(params()))).await.is_err());
    }
}
