//! Tile acquisition coordinator.
//!
//! Owns the request lifecycle of every tile of one source: picks the
//! execution path, tracks the tile's outstanding request, queues reloads
//! that arrive while a load is in flight, and reconciles worker results
//! back into tile state.
//!
//! # Paths
//!
//! ```text
//! load_tile(tile)
//!   │
//!   ├─ in flight ───────────────► park sender in the reload slot
//!   │
//!   ├─ no actor / expired ──┬─ dispatcher ready ──► LoadTile ─────────────┐
//!   │                       └─ not ready ─► DedupeTable fetch ─► LoadTile │
//!   │                                        (bytes attached)             │
//!   └─ bound actor ─────────────► ReloadTile ─────────────────────────────┤
//!                                                                         ▼
//!                                                     complete(): state, expiry,
//!                                                     data, then re-issue the slot
//! ```
//!
//! Every operation returns immediately. Network and worker round trips run
//! on spawned tasks; each carries a request id and a cancellation token so a
//! superseded or aborted request can never touch the tile.

use crate::config::SourceConfig;
use crate::dedupe::DedupeTable;
use crate::dispatch::{Actor, Dispatcher, TileParams, WorkerMessage, WorkerReply};
use crate::error::SourceError;
use crate::fetch::{Request, RequestTransform, ResourceFetcher, ResourceKind};
use crate::source::observer::{SourceEvent, SourceObserver};
use crate::tile::{PendingRequest, Tile, TileLoadOutcome, TileLoadResult, TileState};
use crate::tilejson::SourceDescriptor;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Value of `TileParams::source_type` for tiles from this coordinator.
pub const VECTOR_SOURCE_TYPE: &str = "vector";

/// Collaborators of a [`TileCoordinator`].
#[derive(Clone)]
pub struct CoordinatorContext {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub transform: Arc<dyn RequestTransform>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub dedupe: DedupeTable,
    pub observer: Arc<dyn SourceObserver>,
    pub config: SourceConfig,
}

struct CoordinatorInner {
    source_id: String,
    context: CoordinatorContext,
    descriptor: RwLock<Option<Arc<SourceDescriptor>>>,
    /// Tile URL → actor that first loaded it
    assignments: DashMap<String, Actor>,
    next_request_id: AtomicU64,
}

/// Per-source tile request coordinator.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct TileCoordinator {
    inner: Arc<CoordinatorInner>,
}

/// How a load is executed.
enum Dispatch {
    /// Worker fetches and decodes
    Worker(WorkerMessage),
    /// Fetch through the dedupe table first, then ask the worker to decode
    Inline(TileParams),
}

impl TileCoordinator {
    pub fn new(source_id: impl Into<String>, context: CoordinatorContext) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                source_id: source_id.into(),
                context,
                descriptor: RwLock::new(None),
                assignments: DashMap::new(),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.inner.source_id
    }

    pub fn config(&self) -> &SourceConfig {
        &self.inner.context.config
    }

    /// Installs (or clears) the descriptor tile URLs are built from.
    pub fn set_descriptor(&self, descriptor: Option<Arc<SourceDescriptor>>) {
        *self.inner.descriptor.write() = descriptor;
    }

    pub fn descriptor(&self) -> Option<Arc<SourceDescriptor>> {
        self.inner.descriptor.read().clone()
    }

    /// Forgets every tile-to-worker assignment.
    ///
    /// Called after each batch update; affinity is only an optimization.
    pub fn clear_worker_assignments(&self) {
        let cleared = self.inner.assignments.len();
        self.inner.assignments.clear();
        trace!(source = %self.inner.source_id, cleared = cleared, "Cleared worker assignments");
    }

    /// Number of remembered tile-to-worker assignments.
    pub fn assignment_count(&self) -> usize {
        self.inner.assignments.len()
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Starts loading `tile`. The receiver resolves exactly once.
    pub fn load_tile(&self, tile: &Arc<Tile>) -> oneshot::Receiver<TileLoadResult> {
        let (tx, rx) = oneshot::channel();
        self.load_tile_with(tile, tx);
        rx
    }

    fn load_tile_with(&self, tile: &Arc<Tile>, tx: oneshot::Sender<TileLoadResult>) {
        let Some(descriptor) = self.descriptor() else {
            let _ = tx.send(Err(SourceError::NotLoaded));
            return;
        };
        let config = &self.inner.context.config;
        let Some(url) = descriptor.tile_url(&tile.id().canonical, config.pixel_ratio()) else {
            let _ = tx.send(Err(SourceError::Parse(format!(
                "source {} has no tile URL templates",
                self.inner.source_id
            ))));
            return;
        };

        let mut inner = tile.lock();

        if inner.state.is_in_flight() {
            if let Some(previous) = inner.reload_slot.replace(tx) {
                let _ = previous.send(Ok(TileLoadOutcome::Superseded));
            }
            debug!(
                source = %self.inner.source_id,
                tile = %tile.id(),
                "Load already in flight, queued reload"
            );
            return;
        }

        let request = self
            .inner
            .context
            .transform
            .transform(&url, ResourceKind::Tile);
        let params = self.tile_params(tile, &descriptor, request, inner.is_symbol_tile());

        let (actor, dispatch, fresh) = match inner.actor.clone() {
            Some(actor) if inner.state != TileState::Expired => (
                actor,
                Dispatch::Worker(WorkerMessage::ReloadTile(Box::new(params))),
                false,
            ),
            _ => {
                let actor = self
                    .inner
                    .assignments
                    .entry(url)
                    .or_insert_with(|| self.inner.context.dispatcher.get_actor())
                    .clone();
                inner.actor = Some(actor.clone());
                let dispatch = if self.inner.context.dispatcher.is_ready() {
                    Dispatch::Worker(WorkerMessage::LoadTile(Box::new(params)))
                } else {
                    Dispatch::Inline(params)
                };
                (actor, dispatch, true)
            }
        };

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        inner.request = Some(PendingRequest {
            id: request_id,
            cancel: cancel.clone(),
        });
        inner.aborted = false;
        inner.resume_state = inner.state;
        inner.state = if fresh {
            TileState::Loading
        } else {
            TileState::Reloading
        };
        drop(inner);

        debug!(
            source = %self.inner.source_id,
            tile = %tile.id(),
            actor = %actor.id(),
            request_id = request_id,
            inline = matches!(dispatch, Dispatch::Inline(_)),
            fresh = fresh,
            "Dispatching tile load"
        );

        let coordinator = self.clone();
        let tile = Arc::clone(tile);
        match dispatch {
            Dispatch::Worker(message) => {
                tokio::spawn(async move {
                    let reply = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        reply = actor.request(message) => Some(reply),
                    };
                    coordinator.complete(&tile, request_id, reply, tx);
                });
            }
            Dispatch::Inline(params) => {
                tokio::spawn(async move {
                    let reply = coordinator.fetch_inline(actor, params, &cancel).await;
                    coordinator.complete(&tile, request_id, reply, tx);
                });
            }
        }
    }

    /// Worker-cold path: fetch through the dedupe table, then hand the bytes
    /// to the worker for decoding only.
    ///
    /// Returns `None` when cancelled.
    async fn fetch_inline(
        &self,
        actor: Actor,
        mut params: TileParams,
        cancel: &CancellationToken,
    ) -> Option<WorkerReply> {
        let fetcher = Arc::clone(&self.inner.context.fetcher);
        let request = params.request.clone();
        let waiter = self
            .inner
            .context
            .dedupe
            .request(&params.request.url, move || async move {
                fetcher.fetch(&request).await
            });

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            fetched = waiter.wait() => fetched,
        };

        match fetched {
            Ok(raw) => {
                params.data = Some(raw);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    reply = actor.request(WorkerMessage::LoadTile(Box::new(params))) => Some(reply),
                }
            }
            // No worker message on inline failure
            Err(e) => Some(Err(e)),
        }
    }

    /// Applies a finished request to the tile and answers the requester.
    fn complete(
        &self,
        tile: &Arc<Tile>,
        request_id: u64,
        reply: Option<WorkerReply>,
        tx: oneshot::Sender<TileLoadResult>,
    ) {
        let mut inner = tile.lock();
        let current = inner.request.as_ref().map(|r| r.id) == Some(request_id);
        if current {
            inner.request = None;
        }

        let reply = match reply {
            Some(reply) if current && !inner.aborted => reply,
            // Cancelled, superseded by abort/unload, or aborted meanwhile
            _ => {
                drop(inner);
                trace!(tile = %tile.id(), request_id = request_id, "Discarding aborted result");
                let _ = tx.send(Ok(TileLoadOutcome::Aborted));
                return;
            }
        };

        let config = &self.inner.context.config;
        let (result, event) = match reply {
            Ok(result) => {
                let decoded = result.map(|result| {
                    if let Some(timing) = result.resource_timing {
                        inner.push_resource_timing(timing);
                    }
                    if config.refresh_expired_tiles() {
                        inner.set_expiry_data(&result.expiry);
                    }
                    result.decoded
                });
                inner.load_vector_data(decoded);
                (
                    Ok(TileLoadOutcome::Loaded),
                    SourceEvent::TileLoaded {
                        source: self.inner.source_id.clone(),
                        tile: tile.id(),
                    },
                )
            }
            Err(error) => {
                inner.state = TileState::Errored;
                (
                    Err(error.clone()),
                    SourceEvent::TileError {
                        source: self.inner.source_id.clone(),
                        tile: tile.id(),
                        error,
                    },
                )
            }
        };
        let queued = inner.reload_slot.take();
        let state = inner.state;
        drop(inner);

        debug!(
            source = %self.inner.source_id,
            tile = %tile.id(),
            request_id = request_id,
            state = %state,
            reload_queued = queued.is_some(),
            "Tile request completed"
        );
        self.inner.context.observer.emit(event);
        let _ = tx.send(result);

        if let Some(queued) = queued {
            self.load_tile_with(tile, queued);
        }
    }

    // =========================================================================
    // Abort / unload
    // =========================================================================

    /// Aborts the tile's outstanding request.
    ///
    /// The in-flight load and any queued reload resolve with
    /// `Ok(TileLoadOutcome::Aborted)`. The bound worker, if any, is told to
    /// release its state for the load.
    pub fn abort_tile(&self, tile: &Arc<Tile>) {
        let mut inner = tile.lock();
        inner.aborted = true;
        if let Some(request) = inner.request.take() {
            request.cancel.cancel();
        }
        if inner.state.is_in_flight() {
            inner.state = inner.resume_state;
        }
        let queued = inner.reload_slot.take();
        let actor = inner.actor.clone();
        drop(inner);

        debug!(source = %self.inner.source_id, tile = %tile.id(), "Aborting tile");
        if let Some(queued) = queued {
            let _ = queued.send(Ok(TileLoadOutcome::Aborted));
        }
        if let Some(actor) = actor {
            actor.notify(WorkerMessage::AbortTile {
                source: self.inner.source_id.clone(),
                uid: tile.uid(),
            });
        }
    }

    /// Releases the tile's data and its worker-side state. Called once, at
    /// eviction.
    pub fn unload_tile(&self, tile: &Arc<Tile>) {
        let mut inner = tile.lock();
        if let Some(request) = inner.request.take() {
            request.cancel.cancel();
        }
        let queued = inner.reload_slot.take();
        inner.unload_vector_data();
        let actor = inner.actor.clone();
        drop(inner);

        debug!(source = %self.inner.source_id, tile = %tile.id(), "Unloading tile");
        if let Some(queued) = queued {
            let _ = queued.send(Ok(TileLoadOutcome::Aborted));
        }
        if let Some(actor) = actor {
            actor.notify(WorkerMessage::RemoveTile {
                source: self.inner.source_id.clone(),
                uid: tile.uid(),
            });
        }
    }

    /// Returns true if the loaded descriptor covers `tile`.
    pub fn has_tile(&self, tile: &Tile) -> bool {
        self.descriptor()
            .map(|descriptor| descriptor.has_tile(&tile.id()))
            .unwrap_or(false)
    }

    fn tile_params(
        &self,
        tile: &Tile,
        descriptor: &SourceDescriptor,
        request: Request,
        is_symbol_tile: bool,
    ) -> TileParams {
        let id = tile.id();
        let config = &self.inner.context.config;
        TileParams {
            request,
            data: None,
            uid: tile.uid(),
            tile_id: id,
            tile_zoom: id.canonical.z,
            zoom: id.overscaled_z,
            tile_size: descriptor.tile_size.saturating_mul(id.overscale_factor()),
            source_type: VECTOR_SOURCE_TYPE.to_string(),
            source: self.inner.source_id.clone(),
            pixel_ratio: config.pixel_ratio(),
            show_collision_boxes: config.show_collision_boxes(),
            promote_id: descriptor.promote_id.clone(),
            is_symbol_tile,
            collect_resource_timing: config.collect_resource_timing(),
        }
    }
}

impl std::fmt::Debug for TileCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCoordinator")
            .field("source", &self.inner.source_id)
            .field("assignments", &self.inner.assignments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DecodedTile, Envelope, RecordingDispatcher, ResourceTiming, WorkerTileResult};
    use crate::fetch::{FetchedResource, IdentityTransform, MockFetcher};
    use crate::source::observer::ChannelObserver;
    use crate::tile::{ExpiryData, OverscaledTileId};
    use crate::tilejson::SourceOptions;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const TEMPLATE: &str = "https://t.example.com/{z}/{x}/{y}.pbf";
    const URL: &str = "https://t.example.com/3/1/2.pbf";

    struct Harness {
        coordinator: TileCoordinator,
        dedupe: DedupeTable,
        dispatcher: Arc<RecordingDispatcher>,
        fetcher: Arc<MockFetcher>,
        events: mpsc::UnboundedReceiver<SourceEvent>,
    }

    fn harness_with(ready: bool, fetcher: MockFetcher, config: SourceConfig) -> Harness {
        let dispatcher = Arc::new(RecordingDispatcher::new(ready));
        let fetcher = Arc::new(fetcher);
        let (observer, events) = ChannelObserver::new();
        let dedupe = DedupeTable::new();
        let coordinator = TileCoordinator::new(
            "streets",
            CoordinatorContext {
                fetcher: Arc::clone(&fetcher) as Arc<dyn ResourceFetcher>,
                transform: Arc::new(IdentityTransform),
                dispatcher: Arc::clone(&dispatcher) as Arc<dyn Dispatcher>,
                dedupe: dedupe.clone(),
                observer: Arc::new(observer),
                config,
            },
        );
        let descriptor = SourceDescriptor::resolve(&SourceOptions::from_tiles([TEMPLATE]), None)
            .unwrap();
        coordinator.set_descriptor(Some(Arc::new(descriptor)));
        Harness {
            coordinator,
            dedupe,
            dispatcher,
            fetcher,
            events,
        }
    }

    fn harness(ready: bool) -> Harness {
        harness_with(ready, MockFetcher::new(), SourceConfig::default())
    }

    fn tile() -> Arc<Tile> {
        Arc::new(Tile::new(OverscaledTileId::new(3, 0, 3, 1, 2).unwrap()))
    }

    fn decoded(body: &'static [u8]) -> WorkerTileResult {
        WorkerTileResult {
            decoded: DecodedTile {
                data: Bytes::from_static(body),
                gzipped: false,
            },
            expiry: ExpiryData::default(),
            resource_timing: None,
        }
    }

    fn reply(envelope: Envelope, reply: WorkerReply) -> WorkerMessage {
        let (message, tx) = envelope.into_parts();
        tx.expect("message expects a reply").send(reply).unwrap();
        message
    }

    async fn resolved(rx: oneshot::Receiver<TileLoadResult>) -> TileLoadResult {
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("load did not resolve")
            .expect("sender dropped")
    }

    #[tokio::test]
    async fn test_ready_dispatch_loads_tile() {
        let mut h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        assert_eq!(tile.state(), TileState::Loading);
        assert!(tile.has_pending_request());

        let envelope = h.dispatcher.next().await;
        let message = reply(envelope, Ok(Some(decoded(b"abc"))));
        match &message {
            WorkerMessage::LoadTile(params) => {
                assert_eq!(params.request.url, URL);
                assert_eq!(params.uid, tile.uid());
                assert_eq!(params.source, "streets");
                assert_eq!(params.source_type, "vector");
                assert_eq!(params.tile_size, 512);
                assert!(params.data.is_none());
            }
            other => panic!("unexpected message {}", other),
        }

        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(tile.state(), TileState::Loaded);
        assert_eq!(&tile.data().unwrap().data[..], b"abc");
        assert!(!tile.has_pending_request());
        assert_eq!(h.coordinator.assignment_count(), 1);
        assert!(matches!(
            h.events.recv().await,
            Some(SourceEvent::TileLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_load_while_pending_is_queued() {
        let h = harness(true);
        let tile = tile();

        let first = h.coordinator.load_tile(&tile);
        let second = h.coordinator.load_tile(&tile);
        assert!(tile.has_pending_reload());

        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v1"))));
        assert_eq!(resolved(first).await, Ok(TileLoadOutcome::Loaded));

        // The queued request is re-issued as a reload on the same worker
        let message = reply(h.dispatcher.next().await, Ok(Some(decoded(b"v2"))));
        assert_eq!(message.kind(), "reload_tile");
        assert_eq!(resolved(second).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(&tile.data().unwrap().data[..], b"v2");
        assert!(h.dispatcher.try_next().await.is_none());
    }

    #[tokio::test]
    async fn test_reload_slot_is_last_writer_wins() {
        let h = harness(true);
        let tile = tile();

        let first = h.coordinator.load_tile(&tile);
        let second = h.coordinator.load_tile(&tile);
        let third = h.coordinator.load_tile(&tile);

        assert_eq!(resolved(second).await, Ok(TileLoadOutcome::Superseded));

        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v1"))));
        assert_eq!(resolved(first).await, Ok(TileLoadOutcome::Loaded));
        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v2"))));
        assert_eq!(resolved(third).await, Ok(TileLoadOutcome::Loaded));
    }

    #[tokio::test]
    async fn test_loaded_tile_reloads_on_bound_actor() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v1"))));
        resolved(rx).await.unwrap();

        let rx = h.coordinator.load_tile(&tile);
        assert_eq!(tile.state(), TileState::Reloading);
        let message = reply(h.dispatcher.next().await, Ok(Some(decoded(b"v2"))));
        assert_eq!(message.kind(), "reload_tile");
        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(h.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_tile_gets_fresh_dispatch() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v1"))));
        resolved(rx).await.unwrap();

        tile.mark_expired();
        let rx = h.coordinator.load_tile(&tile);
        assert_eq!(tile.state(), TileState::Loading);
        let message = reply(h.dispatcher.next().await, Ok(Some(decoded(b"v2"))));
        assert_eq!(message.kind(), "load_tile");
        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
    }

    #[tokio::test]
    async fn test_abort_in_flight_resolves_aborted() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        let queued = h.coordinator.load_tile(&tile);
        let load = h.dispatcher.next().await;

        h.coordinator.abort_tile(&tile);
        assert!(!tile.has_pending_request());
        assert!(!tile.has_pending_reload());
        assert!(tile.is_aborted());
        assert_eq!(tile.state(), TileState::Idle);

        let (message, _) = h.dispatcher.next().await.into_parts();
        assert_eq!(message.kind(), "abort_tile");
        assert_eq!(message.tile_key(), ("streets", tile.uid()));

        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Aborted));
        assert_eq!(resolved(queued).await, Ok(TileLoadOutcome::Aborted));
        drop(load);
    }

    #[tokio::test]
    async fn test_load_after_abort_succeeds() {
        let h = harness(true);
        let tile = tile();

        let aborted = h.coordinator.load_tile(&tile);
        let _load = h.dispatcher.next().await;
        h.coordinator.abort_tile(&tile);
        let _abort = h.dispatcher.next().await;
        assert_eq!(resolved(aborted).await, Ok(TileLoadOutcome::Aborted));

        // Actor is still bound, so the retry is a reload on that worker
        let rx = h.coordinator.load_tile(&tile);
        assert!(!tile.is_aborted());
        let message = reply(h.dispatcher.next().await, Ok(Some(decoded(b"ok"))));
        assert_eq!(message.kind(), "reload_tile");
        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
    }

    #[tokio::test]
    async fn test_worker_error_is_delivered() {
        let mut h = harness(true);
        let tile = tile();
        let not_found = SourceError::NotFound {
            url: URL.to_string(),
        };

        let rx = h.coordinator.load_tile(&tile);
        reply(h.dispatcher.next().await, Err(not_found.clone()));

        assert_eq!(resolved(rx).await, Err(not_found));
        assert_eq!(tile.state(), TileState::Errored);
        assert!(tile.resource_timing().is_empty());
        assert!(matches!(
            h.events.recv().await,
            Some(SourceEvent::TileError { .. })
        ));
    }

    #[tokio::test]
    async fn test_worker_cold_path_fetches_inline_first() {
        let fetcher = MockFetcher::gated();
        fetcher.respond_bytes(URL, b"raw");
        let h = harness_with(false, fetcher, SourceConfig::default());
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        assert_eq!(tile.state(), TileState::Loading);
        tokio::task::yield_now().await;
        assert!(h.dispatcher.try_next().await.is_none());

        h.fetcher.release(1);
        let message = reply(h.dispatcher.next().await, Ok(Some(decoded(b"decoded"))));
        match message {
            WorkerMessage::LoadTile(params) => {
                assert_eq!(&params.data.unwrap().data[..], b"raw");
            }
            other => panic!("unexpected message {}", other),
        }
        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(h.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_cold_failure_sends_no_message() {
        let h = harness(false);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        let result = resolved(rx).await;

        assert!(result.unwrap_err().is_not_found());
        assert!(h.dispatcher.try_next().await.is_none());
        assert_eq!(tile.state(), TileState::Errored);
    }

    #[tokio::test]
    async fn test_worker_cold_tiles_share_inline_fetch() {
        let fetcher = MockFetcher::gated();
        fetcher.respond_bytes(URL, b"raw");
        let h = harness_with(false, fetcher, SourceConfig::default());
        let a = tile();
        let b = Arc::new(Tile::new(OverscaledTileId::new(4, 0, 3, 1, 2).unwrap()));

        let rx_a = h.coordinator.load_tile(&a);
        let rx_b = h.coordinator.load_tile(&b);
        while h.dedupe.waiter_count(URL) < 2 {
            tokio::task::yield_now().await;
        }
        h.fetcher.release(1);

        reply(h.dispatcher.next().await, Ok(Some(decoded(b"x"))));
        reply(h.dispatcher.next().await, Ok(Some(decoded(b"x"))));
        assert_eq!(resolved(rx_a).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(resolved(rx_b).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(h.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unload_releases_worker_state() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        reply(h.dispatcher.next().await, Ok(Some(decoded(b"v1"))));
        resolved(rx).await.unwrap();

        h.coordinator.unload_tile(&tile);
        assert_eq!(tile.state(), TileState::Unloaded);
        assert!(!tile.has_data());
        let (message, _) = h.dispatcher.next().await.into_parts();
        assert_eq!(message.kind(), "remove_tile");
    }

    #[tokio::test]
    async fn test_unload_in_flight_resolves_aborted() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        let _load = h.dispatcher.next().await;
        h.coordinator.unload_tile(&tile);

        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Aborted));
        assert_eq!(tile.state(), TileState::Unloaded);
    }

    #[tokio::test]
    async fn test_expiry_and_timing_applied_on_success() {
        let config = SourceConfig::new().with_collect_resource_timing(true);
        let h = harness_with(true, MockFetcher::new(), config);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        let envelope = h.dispatcher.next().await;
        if let WorkerMessage::LoadTile(params) = envelope.message() {
            assert!(params.collect_resource_timing);
        }
        let mut result = decoded(b"abc");
        result.expiry = ExpiryData::new(Some("max-age=300"), None);
        result.resource_timing = Some(ResourceTiming {
            url: URL.to_string(),
            duration: Duration::from_millis(12),
        });
        reply(envelope, Ok(Some(result)));

        resolved(rx).await.unwrap();
        assert_eq!(tile.resource_timing().len(), 1);
        assert!(tile.expiry_timeout().unwrap() <= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_expiry_ignored_when_refresh_disabled() {
        let config = SourceConfig::new().with_refresh_expired_tiles(false);
        let h = harness_with(true, MockFetcher::new(), config);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        let mut result = decoded(b"abc");
        result.expiry = ExpiryData::new(Some("max-age=300"), None);
        reply(h.dispatcher.next().await, Ok(Some(result)));

        resolved(rx).await.unwrap();
        assert!(tile.expiry_timeout().is_none());
    }

    #[tokio::test]
    async fn test_empty_tile_is_loaded() {
        let h = harness(true);
        let tile = tile();

        let rx = h.coordinator.load_tile(&tile);
        reply(h.dispatcher.next().await, Ok(None));

        assert_eq!(resolved(rx).await, Ok(TileLoadOutcome::Loaded));
        assert_eq!(tile.state(), TileState::Loaded);
        assert!(!tile.has_data());
    }

    #[tokio::test]
    async fn test_no_descriptor_is_not_loaded() {
        let h = harness(true);
        h.coordinator.set_descriptor(None);

        let result = resolved(h.coordinator.load_tile(&tile())).await;
        assert_eq!(result, Err(SourceError::NotLoaded));
    }

    #[tokio::test]
    async fn test_overscaled_params() {
        let h = harness(true);
        let tile = Arc::new(Tile::new(OverscaledTileId::new(5, 0, 3, 1, 2).unwrap()));

        let _rx = h.coordinator.load_tile(&tile);
        let envelope = h.dispatcher.next().await;
        match envelope.message() {
            WorkerMessage::LoadTile(params) => {
                assert_eq!(params.zoom, 5);
                assert_eq!(params.tile_zoom, 3);
                assert_eq!(params.tile_size, 2048);
                assert_eq!(params.request.url, URL);
            }
            other => panic!("unexpected message {}", other),
        }
    }

    #[tokio::test]
    async fn test_deep_overscale_saturates_tile_size() {
        let h = harness(true);
        let tile = Arc::new(Tile::new(OverscaledTileId::new(30, 0, 0, 0, 0).unwrap()));

        let _rx = h.coordinator.load_tile(&tile);
        let envelope = h.dispatcher.next().await;
        match envelope.message() {
            WorkerMessage::LoadTile(params) => {
                assert_eq!(params.zoom, 30);
                assert_eq!(params.tile_size, u32::MAX);
            }
            other => panic!("unexpected message {}", other),
        }
        assert_eq!(tile.state(), TileState::Loading);
    }

    #[tokio::test]
    async fn test_clear_worker_assignments() {
        let h = harness(true);
        let tile = tile();
        let _rx = h.coordinator.load_tile(&tile);
        assert_eq!(h.coordinator.assignment_count(), 1);

        h.coordinator.clear_worker_assignments();
        assert_eq!(h.coordinator.assignment_count(), 0);
    }

    #[tokio::test]
    async fn test_inline_bytes_reach_worker_unchanged() {
        let fetcher = MockFetcher::new();
        fetcher.respond(
            URL,
            Ok(FetchedResource::new(URL, b"raw".to_vec())
                .with_expiry(ExpiryData::new(Some("max-age=60"), None))),
        );
        let h = harness_with(false, fetcher, SourceConfig::default());
        let tile = tile();

        let _rx = h.coordinator.load_tile(&tile);
        let envelope = h.dispatcher.next().await;
        match envelope.message() {
            WorkerMessage::LoadTile(params) => {
                let data = params.data.as_ref().unwrap();
                assert_eq!(data.expiry.cache_control.as_deref(), Some("max-age=60"));
            }
            other => panic!("unexpected message {}", other),
        }
    }
}
