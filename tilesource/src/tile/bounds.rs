//! Geographic bounds of a tile source.
//!
//! Converts a `[west, south, east, north]` box into a tile range per zoom so
//! that tiles outside the data extent are never requested.

use super::id::CanonicalTileId;
use std::f64::consts::PI;

/// Web Mercator valid latitude range
pub const MAX_LAT: f64 = 85.051129;

/// The whole world, used when a source declares no bounds.
pub const WORLD_BOUNDS: [f64; 4] = [-180.0, -MAX_LAT, 180.0, MAX_LAT];

/// Lon/lat bounding box of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    min_zoom: u8,
    max_zoom: u8,
}

impl TileBounds {
    /// Creates bounds from a `[west, south, east, north]` array, clamped to
    /// the valid Web Mercator range.
    pub fn new(bounds: [f64; 4], min_zoom: u8, max_zoom: u8) -> Self {
        let [west, south, east, north] = bounds;
        Self {
            west: west.clamp(-180.0, 180.0),
            south: south.clamp(-MAX_LAT, MAX_LAT),
            east: east.clamp(-180.0, 180.0),
            north: north.clamp(-MAX_LAT, MAX_LAT),
            min_zoom,
            max_zoom,
        }
    }

    /// Returns the bounds as `[west, south, east, north]`.
    pub fn as_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Returns true if `tile` is inside the zoom range and intersects the box.
    pub fn contains(&self, tile: &CanonicalTileId) -> bool {
        if tile.z < self.min_zoom || tile.z > self.max_zoom {
            return false;
        }
        let n = tile.dim() as f64;
        let min_x = (lon_to_x(self.west) * n).floor();
        let max_x = (lon_to_x(self.east) * n).ceil();
        let min_y = (lat_to_y(self.north) * n).floor();
        let max_y = (lat_to_y(self.south) * n).ceil();

        let x = f64::from(tile.x);
        let y = f64::from(tile.y);
        x >= min_x && x < max_x && y >= min_y && y < max_y
    }
}

/// Longitude to normalized Mercator x in `[0, 1]`.
#[inline]
fn lon_to_x(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

/// Latitude to normalized Mercator y in `[0, 1]`, 0 at the north edge.
#[inline]
fn lat_to_y(lat: f64) -> f64 {
    let lat_rad = lat * PI / 180.0;
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0
}
