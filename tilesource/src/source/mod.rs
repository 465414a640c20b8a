//! Vector tile source: metadata lifecycle plus tile loading.
//!
//! # Lifecycle
//!
//! ```text
//! Unloaded ──load()──► Loading ──metadata ok──► Loaded
//!                        │  ▲                      │
//!                        │  └──set_url/set_tiles───┘
//!                        └──metadata error──► Errored
//! ```
//!
//! `set_url` and `set_tiles` cancel any in-flight metadata request, tell
//! dependent caches to drop their tiles ([`SourceEvent::ClearTiles`]) and
//! start over. A superseded metadata result is never applied.
//!
//! # Example
//!
//! ```ignore
//! use tilesource::source::{SourceContext, VectorTileSource};
//! use tilesource::tilejson::SourceOptions;
//!
//! let source = VectorTileSource::new(
//!     "streets",
//!     SourceOptions::from_url("https://tiles.example.com/streets.json"),
//!     SourceContext::new(fetcher, pool),
//! );
//! source.load();
//! source.wait_loaded().await?;
//!
//! let tile = Arc::new(Tile::new(OverscaledTileId::new(3, 0, 3, 1, 2)?));
//! source.load_tile(&tile).await?;
//! ```

mod coordinator;
mod observer;

pub use coordinator::{CoordinatorContext, TileCoordinator, VECTOR_SOURCE_TYPE};
pub use observer::{
    ChannelObserver, NullObserver, ObserverSet, SourceEvent, SourceObserver, TracingObserver,
};

use crate::config::SourceConfig;
use crate::dedupe::DedupeTable;
use crate::dispatch::Dispatcher;
use crate::error::SourceError;
use crate::fetch::{
    IdentityTransform, PassthroughNormalizer, RequestTransform, ResourceFetcher, UrlNormalizer,
};
use crate::tile::{Tile, TileLoadResult};
use crate::tilejson::{load_tilejson, MetadataContext, SourceDescriptor, SourceOptions};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Metadata lifecycle state of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Errored,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceStatus::Unloaded => "unloaded",
            SourceStatus::Loading => "loading",
            SourceStatus::Loaded => "loaded",
            SourceStatus::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Shared collaborators of a source.
#[derive(Clone)]
pub struct SourceContext {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub transform: Arc<dyn RequestTransform>,
    pub normalizer: Arc<dyn UrlNormalizer>,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Usually one table for the whole process
    pub dedupe: DedupeTable,
    pub config: SourceConfig,
}

impl SourceContext {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            fetcher,
            transform: Arc::new(IdentityTransform),
            normalizer: Arc::new(PassthroughNormalizer),
            dispatcher,
            dedupe: DedupeTable::new(),
            config: SourceConfig::default(),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn RequestTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn UrlNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_dedupe(mut self, dedupe: DedupeTable) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    fn metadata_context(&self) -> MetadataContext {
        MetadataContext::new(Arc::clone(&self.fetcher))
            .with_transform(Arc::clone(&self.transform))
            .with_normalizer(Arc::clone(&self.normalizer))
    }
}

struct Lifecycle {
    options: SourceOptions,
    /// Bumped on every (re)load; results from older generations are dropped
    generation: u64,
    metadata: Option<CancellationToken>,
    last_error: Option<SourceError>,
}

struct SourceInner {
    id: String,
    metadata_context: MetadataContext,
    lifecycle: Mutex<Lifecycle>,
    status: watch::Sender<SourceStatus>,
    coordinator: TileCoordinator,
    observers: ObserverSet,
}

/// A vector tile source.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct VectorTileSource {
    inner: Arc<SourceInner>,
}

impl VectorTileSource {
    /// Creates an unloaded source. Call [`load`](Self::load) to resolve
    /// metadata.
    pub fn new(id: impl Into<String>, options: SourceOptions, context: SourceContext) -> Self {
        let id = id.into();
        let observers = ObserverSet::new();
        let coordinator = TileCoordinator::new(
            id.clone(),
            CoordinatorContext {
                fetcher: Arc::clone(&context.fetcher),
                transform: Arc::clone(&context.transform),
                dispatcher: Arc::clone(&context.dispatcher),
                dedupe: context.dedupe.clone(),
                observer: Arc::new(observers.clone()),
                config: context.config,
            },
        );
        let (status, _) = watch::channel(SourceStatus::Unloaded);

        Self {
            inner: Arc::new(SourceInner {
                id,
                metadata_context: context.metadata_context(),
                lifecycle: Mutex::new(Lifecycle {
                    options,
                    generation: 0,
                    metadata: None,
                    last_error: None,
                }),
                status,
                coordinator,
                observers,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn add_observer(&self, observer: Arc<dyn SourceObserver>) {
        self.inner.observers.add(observer);
    }

    pub fn coordinator(&self) -> &TileCoordinator {
        &self.inner.coordinator
    }

    /// Current options (as last set).
    pub fn options(&self) -> SourceOptions {
        self.inner.lifecycle.lock().options.clone()
    }

    // =========================================================================
    // Metadata lifecycle
    // =========================================================================

    /// Starts (or restarts) resolving metadata.
    pub fn load(&self) {
        self.reload(|_| {}, false);
    }

    /// Points the source at a new TileJSON URL and reloads.
    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.reload(
            move |options| {
                options.url = Some(url);
                options.tiles = None;
            },
            true,
        );
    }

    /// Replaces the tile templates and reloads.
    pub fn set_tiles<I, S>(&self, tiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tiles: Vec<String> = tiles.into_iter().map(Into::into).collect();
        self.reload(move |options| options.tiles = Some(tiles), true);
    }

    fn reload(&self, update: impl FnOnce(&mut SourceOptions), clear_tiles: bool) {
        let inner = &self.inner;
        let (generation, request) = {
            let mut lifecycle = inner.lifecycle.lock();
            if let Some(previous) = lifecycle.metadata.take() {
                previous.cancel();
                debug!(source = %inner.id, "Cancelled superseded metadata request");
            }
            update(&mut lifecycle.options);
            lifecycle.generation += 1;
            lifecycle.last_error = None;

            let request =
                load_tilejson(lifecycle.options.clone(), inner.metadata_context.clone());
            lifecycle.metadata = Some(request.cancellation_token());
            if clear_tiles {
                inner.coordinator.set_descriptor(None);
                inner.coordinator.clear_worker_assignments();
            }
            inner.status.send_replace(SourceStatus::Loading);
            (lifecycle.generation, request)
        };

        if clear_tiles {
            inner.observers.emit(SourceEvent::ClearTiles {
                source: inner.id.clone(),
            });
        }
        debug!(source = %inner.id, generation = generation, "Loading source metadata");

        let source = self.clone();
        tokio::spawn(async move {
            let result = request.wait().await;
            source.apply_metadata(generation, result);
        });
    }

    fn apply_metadata(&self, generation: u64, result: Result<SourceDescriptor, SourceError>) {
        let inner = &self.inner;
        let event = {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.generation != generation {
                debug!(
                    source = %inner.id,
                    stale = generation,
                    current = lifecycle.generation,
                    "Discarding stale metadata"
                );
                return;
            }
            match result {
                Err(SourceError::Cancelled) => return,
                Ok(descriptor) => {
                    lifecycle.metadata = None;
                    info!(
                        source = %inner.id,
                        templates = descriptor.tiles.len(),
                        minzoom = descriptor.min_zoom,
                        maxzoom = descriptor.max_zoom,
                        "Source loaded"
                    );
                    inner.coordinator.set_descriptor(Some(Arc::new(descriptor)));
                    inner.status.send_replace(SourceStatus::Loaded);
                    None
                }
                Err(error) => {
                    lifecycle.metadata = None;
                    lifecycle.last_error = Some(error.clone());
                    warn!(source = %inner.id, error = %error, "Source metadata failed");
                    inner.status.send_replace(SourceStatus::Errored);
                    Some(SourceEvent::Error {
                        source: inner.id.clone(),
                        error,
                    })
                }
            }
        };

        match event {
            Some(event) => inner.observers.emit(event),
            None => {
                inner.observers.emit(SourceEvent::MetadataLoaded {
                    source: inner.id.clone(),
                });
                inner.observers.emit(SourceEvent::ContentChanged {
                    source: inner.id.clone(),
                });
            }
        }
    }

    pub fn status(&self) -> SourceStatus {
        *self.inner.status.borrow()
    }

    /// Returns true once metadata has resolved.
    pub fn loaded(&self) -> bool {
        self.status() == SourceStatus::Loaded
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SourceStatus> {
        self.inner.status.subscribe()
    }

    /// Resolved descriptor, if loaded.
    pub fn descriptor(&self) -> Option<Arc<SourceDescriptor>> {
        self.inner.coordinator.descriptor()
    }

    /// Waits until metadata resolves or fails.
    pub async fn wait_loaded(&self) -> Result<Arc<SourceDescriptor>, SourceError> {
        let mut rx = self.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            match status {
                SourceStatus::Loaded => {
                    if let Some(descriptor) = self.descriptor() {
                        return Ok(descriptor);
                    }
                }
                SourceStatus::Errored => {
                    let error = self.inner.lifecycle.lock().last_error.clone();
                    return Err(error.unwrap_or(SourceError::NotLoaded));
                }
                SourceStatus::Unloaded => return Err(SourceError::NotLoaded),
                SourceStatus::Loading => {}
            }
            // The sender lives as long as `self`
            if rx.changed().await.is_err() {
                return Err(SourceError::NotLoaded);
            }
        }
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Starts loading a tile; see [`TileCoordinator::load_tile`].
    pub fn load_tile(&self, tile: &Arc<Tile>) -> oneshot::Receiver<TileLoadResult> {
        self.inner.coordinator.load_tile(tile)
    }

    pub fn abort_tile(&self, tile: &Arc<Tile>) {
        self.inner.coordinator.abort_tile(tile);
    }

    pub fn unload_tile(&self, tile: &Arc<Tile>) {
        self.inner.coordinator.unload_tile(tile);
    }

    /// Returns true if the loaded source covers the tile's zoom and bounds.
    pub fn has_tile(&self, tile: &Tile) -> bool {
        self.inner.coordinator.has_tile(tile)
    }

    pub fn clear_worker_assignments(&self) {
        self.inner.coordinator.clear_worker_assignments();
    }
}

impl fmt::Debug for VectorTileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorTileSource")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}
