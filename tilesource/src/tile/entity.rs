//! The tile entity shared between the external tile cache and the
//! coordinator.
//!
//! A [`Tile`] is created by whoever caches tiles and handed to the
//! coordinator as `Arc<Tile>`. All mutable state sits behind one
//! `parking_lot::Mutex` that is never held across an `.await`.

use super::expiry::{ExpiryData, ExpiryState};
use super::id::OverscaledTileId;
use crate::dispatch::{Actor, ActorId, DecodedTile, ResourceTiming};
use crate::error::SourceError;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Never requested
    #[default]
    Idle,
    /// First load in flight
    Loading,
    /// Data materialized
    Loaded,
    /// Reload in flight on the bound worker
    Reloading,
    /// Data is stale; the next load is a fresh dispatch
    Expired,
    /// Data released at eviction
    Unloaded,
    /// Last load failed
    Errored,
}

impl TileState {
    /// Returns true while a load or reload is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TileState::Loading | TileState::Reloading)
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileState::Idle => "idle",
            TileState::Loading => "loading",
            TileState::Loaded => "loaded",
            TileState::Reloading => "reloading",
            TileState::Expired => "expired",
            TileState::Unloaded => "unloaded",
            TileState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// How a successful load request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoadOutcome {
    /// Data was handed to the tile
    Loaded,
    /// The tile was aborted or unloaded before the result arrived
    Aborted,
    /// A later load request replaced this one in the pending reload slot
    Superseded,
}

/// Result delivered to a load requester.
pub type TileLoadResult = Result<TileLoadOutcome, SourceError>;

/// Cancellation handle of the tile's outstanding request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: u64,
    pub(crate) cancel: CancellationToken,
}

/// Mutable tile state. Only the coordinator touches the request fields.
#[derive(Default)]
pub(crate) struct TileInner {
    pub(crate) state: TileState,
    /// State to fall back to if the in-flight request is aborted
    pub(crate) resume_state: TileState,
    pub(crate) request: Option<PendingRequest>,
    pub(crate) actor: Option<Actor>,
    pub(crate) aborted: bool,
    pub(crate) reload_slot: Option<oneshot::Sender<TileLoadResult>>,
    expiry: ExpiryState,
    resource_timing: Vec<ResourceTiming>,
    data: Option<DecodedTile>,
    is_symbol_tile: bool,
}

impl TileInner {
    pub(crate) fn set_expiry_data(&mut self, data: &ExpiryData) -> bool {
        self.expiry.apply(data, Utc::now())
    }

    pub(crate) fn load_vector_data(&mut self, data: Option<DecodedTile>) {
        self.data = data;
        self.state = TileState::Loaded;
    }

    pub(crate) fn unload_vector_data(&mut self) {
        self.data = None;
        self.state = TileState::Unloaded;
    }

    pub(crate) fn push_resource_timing(&mut self, timing: ResourceTiming) {
        self.resource_timing.push(timing);
    }

    pub(crate) fn is_symbol_tile(&self) -> bool {
        self.is_symbol_tile
    }
}

/// A vector tile whose loading is driven by a
/// [`TileCoordinator`](crate::source::TileCoordinator).
pub struct Tile {
    id: OverscaledTileId,
    uid: u64,
    inner: Mutex<TileInner>,
}

impl Tile {
    /// Creates an idle tile with a fresh process-unique uid.
    pub fn new(id: OverscaledTileId) -> Self {
        Self {
            id,
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(TileInner::default()),
        }
    }

    /// Marks the tile as holding symbol layers (forwarded to workers).
    pub fn with_symbols(self, is_symbol_tile: bool) -> Self {
        self.inner.lock().is_symbol_tile = is_symbol_tile;
        self
    }

    pub fn id(&self) -> OverscaledTileId {
        self.id
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TileInner> {
        self.inner.lock()
    }

    pub fn state(&self) -> TileState {
        self.inner.lock().state
    }

    // ------------------------------------------------------------------
    // Consumer contract
    // ------------------------------------------------------------------

    /// Applies the caching headers of a response.
    ///
    /// Returns true if the response was already expired on arrival.
    pub fn set_expiry_data(&self, data: &ExpiryData) -> bool {
        self.inner.lock().set_expiry_data(data)
    }

    /// Materializes decoded data. `None` is an empty tile.
    pub fn load_vector_data(&self, data: Option<DecodedTile>) {
        self.inner.lock().load_vector_data(data);
    }

    /// Releases decoded data.
    pub fn unload_vector_data(&self) {
        self.inner.lock().unload_vector_data();
    }

    /// Delay until the tile should be refreshed, if its data expires.
    pub fn expiry_timeout(&self) -> Option<Duration> {
        self.inner.lock().expiry.timeout(Utc::now())
    }

    /// Called by the cache's refresh timer. Only loaded tiles expire.
    pub fn mark_expired(&self) {
        let mut inner = self.inner.lock();
        if inner.state == TileState::Loaded {
            inner.state = TileState::Expired;
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn data(&self) -> Option<DecodedTile> {
        self.inner.lock().data.clone()
    }

    pub fn has_data(&self) -> bool {
        self.inner.lock().data.is_some()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    pub fn has_pending_request(&self) -> bool {
        self.inner.lock().request.is_some()
    }

    pub fn has_pending_reload(&self) -> bool {
        self.inner.lock().reload_slot.is_some()
    }

    /// Worker this tile is bound to.
    pub fn actor_id(&self) -> Option<ActorId> {
        self.inner.lock().actor.as_ref().map(Actor::id)
    }

    pub fn resource_timing(&self) -> Vec<ResourceTiming> {
        self.inner.lock().resource_timing.clone()
    }

    pub fn expired_request_count(&self) -> u32 {
        self.inner.lock().expiry.expired_request_count()
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("state", &self.state())
            .finish()
    }
}
