//! Source events for dependent caches and UI layers.
//!
//! The source emits structured events and does not care who consumes them.
//! A tile cache listens for [`SourceEvent::ClearTiles`]; a UI layer listens
//! for metadata and content changes.
//!
//! # Example
//!
//! ```ignore
//! use tilesource::source::{SourceEvent, SourceObserver};
//!
//! struct RepaintOnContent;
//!
//! impl SourceObserver for RepaintOnContent {
//!     fn emit(&self, event: SourceEvent) {
//!         if let SourceEvent::ContentChanged { .. } = event {
//!             request_repaint();
//!         }
//!     }
//! }
//! ```

use crate::error::SourceError;
use crate::tile::OverscaledTileId;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a vector source.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    /// Metadata resolved; the descriptor is available.
    MetadataLoaded { source: String },

    /// Tile content may have changed (after metadata load or URL change).
    ContentChanged { source: String },

    /// Every cached tile of this source must be dropped.
    ClearTiles { source: String },

    /// A tile finished loading.
    TileLoaded {
        source: String,
        tile: OverscaledTileId,
    },

    /// A tile load failed.
    TileError {
        source: String,
        tile: OverscaledTileId,
        error: SourceError,
    },

    /// Source-level failure (metadata).
    Error { source: String, error: SourceError },
}

impl SourceEvent {
    /// Id of the source that emitted the event.
    pub fn source(&self) -> &str {
        match self {
            Self::MetadataLoaded { source }
            | Self::ContentChanged { source }
            | Self::ClearTiles { source }
            | Self::TileLoaded { source, .. }
            | Self::TileError { source, .. }
            | Self::Error { source, .. } => source,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MetadataLoaded { .. } => "metadata_loaded",
            Self::ContentChanged { .. } => "content_changed",
            Self::ClearTiles { .. } => "clear_tiles",
            Self::TileLoaded { .. } => "tile_loaded",
            Self::TileError { .. } => "tile_error",
            Self::Error { .. } => "error",
        }
    }
}

// =============================================================================
// Observer Trait
// =============================================================================

/// Receives source events.
///
/// Called synchronously from the coordinator and lifecycle code, so `emit`
/// must be fast and must not block.
pub trait SourceObserver: Send + Sync {
    fn emit(&self, event: SourceEvent);
}

// =============================================================================
// Built-in Observers
// =============================================================================

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SourceObserver for NullObserver {
    fn emit(&self, _event: SourceEvent) {}
}

/// Observer that logs events using `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SourceObserver for TracingObserver {
    fn emit(&self, event: SourceEvent) {
        match &event {
            SourceEvent::MetadataLoaded { source } => {
                tracing::info!(source = %source, "Source metadata loaded");
            }
            SourceEvent::ContentChanged { source } => {
                tracing::debug!(source = %source, "Source content changed");
            }
            SourceEvent::ClearTiles { source } => {
                tracing::debug!(source = %source, "Clearing source tiles");
            }
            SourceEvent::TileLoaded { source, tile } => {
                tracing::trace!(source = %source, tile = %tile, "Tile loaded");
            }
            SourceEvent::TileError {
                source,
                tile,
                error,
            } => {
                tracing::debug!(source = %source, tile = %tile, error = %error, "Tile failed");
            }
            SourceEvent::Error { source, error } => {
                tracing::warn!(source = %source, error = %error, "Source error");
            }
        }
    }
}

/// Observer that forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SourceObserver for ChannelObserver {
    fn emit(&self, event: SourceEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Shared, growable list of observers.
///
/// Clones share the same list.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Arc<RwLock<Vec<Arc<dyn SourceObserver>>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn SourceObserver>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl SourceObserver for ObserverSet {
    fn emit(&self, event: SourceEvent) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observer_count", &self.len())
            .finish()
    }
}
