//! Tile identity, addressing and state.
//!
//! - [`OverscaledTileId`] / [`CanonicalTileId`]: tile keys
//! - [`tile_url`]: URL template expansion
//! - [`TileBounds`]: source extent checks
//! - [`ExpiryState`]: cache-expiry bookkeeping
//! - [`Tile`]: the shared, mutable tile entity

mod bounds;
mod entity;
mod expiry;
mod id;
mod template;

pub use bounds::{TileBounds, MAX_LAT, WORLD_BOUNDS};
pub use entity::{Tile, TileLoadOutcome, TileLoadResult, TileState};
pub(crate) use entity::PendingRequest;
pub use expiry::{
    max_age, parse_http_date, ExpiryData, ExpiryState, CLOCK_SKEW_RETRY_TIMEOUT,
};
pub use id::{CanonicalTileId, OverscaledTileId, TileIdError, MAX_OVERSCALED_ZOOM, MAX_ZOOM};
pub use template::{tile_url, Scheme};
