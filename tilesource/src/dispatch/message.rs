//! Messages exchanged between the tile coordinator and worker actors.

use super::decoder::DecodedTile;
use crate::error::SourceError;
use crate::fetch::{FetchedResource, Request};
use crate::tile::{ExpiryData, OverscaledTileId};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Everything a worker needs to load or reload one tile.
#[derive(Debug, Clone)]
pub struct TileParams {
    /// Request for the raw tile bytes
    pub request: Request,
    /// Bytes already fetched on the coordinator side. When set the worker
    /// only decodes.
    pub data: Option<FetchedResource>,
    /// Process-unique tile id, used to address worker-side state
    pub uid: u64,
    pub tile_id: OverscaledTileId,
    /// Canonical (stored) zoom
    pub tile_zoom: u8,
    /// Display zoom
    pub zoom: u8,
    /// Tile size in pixels after overscaling
    pub tile_size: u32,
    pub source_type: String,
    /// Source id
    pub source: String,
    pub pixel_ratio: f32,
    pub show_collision_boxes: bool,
    pub promote_id: Option<String>,
    pub is_symbol_tile: bool,
    pub collect_resource_timing: bool,
}

/// Worker-side timing of a tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTiming {
    pub url: String,
    pub duration: Duration,
}

/// Successful worker result for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerTileResult {
    pub decoded: DecodedTile,
    /// Caching headers of the response the tile was decoded from
    pub expiry: ExpiryData,
    /// Present when the request asked for resource timing
    pub resource_timing: Option<ResourceTiming>,
}

/// Reply to `LoadTile` / `ReloadTile`.
///
/// `Ok(None)` means the tile has no content (empty body).
pub type WorkerReply = Result<Option<WorkerTileResult>, SourceError>;

/// Message sent to a worker actor.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Fetch (unless `data` is set) and decode a tile
    LoadTile(Box<TileParams>),
    /// Re-decode a tile the worker already holds
    ReloadTile(Box<TileParams>),
    /// Cancel an in-flight load
    AbortTile { source: String, uid: u64 },
    /// Release all worker state for a tile
    RemoveTile { source: String, uid: u64 },
}

impl WorkerMessage {
    /// Short message name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::LoadTile(_) => "load_tile",
            WorkerMessage::ReloadTile(_) => "reload_tile",
            WorkerMessage::AbortTile { .. } => "abort_tile",
            WorkerMessage::RemoveTile { .. } => "remove_tile",
        }
    }

    /// `(source, uid)` of the tile the message addresses.
    pub fn tile_key(&self) -> (&str, u64) {
        match self {
            WorkerMessage::LoadTile(params) | WorkerMessage::ReloadTile(params) => {
                (params.source.as_str(), params.uid)
            }
            WorkerMessage::AbortTile { source, uid } | WorkerMessage::RemoveTile { source, uid } => {
                (source.as_str(), *uid)
            }
        }
    }
}

impl fmt::Display for WorkerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (source, uid) = self.tile_key();
        write!(f, "{}({}#{})", self.kind(), source, uid)
    }
}

/// A message in an actor's mailbox, with an optional reply channel.
#[derive(Debug)]
pub struct Envelope {
    message: WorkerMessage,
    reply: Option<oneshot::Sender<WorkerReply>>,
}

impl Envelope {
    /// Envelope that expects a reply.
    pub fn request(message: WorkerMessage, reply: oneshot::Sender<WorkerReply>) -> Self {
        Self {
            message,
            reply: Some(reply),
        }
    }

    /// Fire-and-forget envelope.
    pub fn notification(message: WorkerMessage) -> Self {
        Self {
            message,
            reply: None,
        }
    }

    pub fn message(&self) -> &WorkerMessage {
        &self.message
    }

    pub fn into_parts(self) -> (WorkerMessage, Option<oneshot::Sender<WorkerReply>>) {
        (self.message, self.reply)
    }
}
