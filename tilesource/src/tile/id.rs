//! Tile identifier types.

use std::fmt;
use thiserror::Error;

/// Highest zoom level a canonical tile id may carry.
pub const MAX_ZOOM: u8 = 25;

/// Highest zoom level an overscaled tile may be rendered at.
pub const MAX_OVERSCALED_ZOOM: u8 = 30;

/// Errors that can occur when building tile ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileIdError {
    /// Zoom level is outside 0..=MAX_ZOOM
    #[error("invalid zoom level: {0} (must be between 0 and {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// x or y does not fit the tile grid at this zoom
    #[error("tile ({x}, {y}) is outside the {dim}x{dim} grid at zoom {z}")]
    OutOfRange { z: u8, x: u32, y: u32, dim: u64 },

    /// Overscaled zoom is lower than the canonical zoom, or too high
    #[error("invalid overscaled zoom {overscaled_z} for canonical zoom {z}")]
    InvalidOverscale { overscaled_z: u8, z: u8 },
}

/// Tile coordinates in the Web Mercator / slippy map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalTileId {
    /// Zoom level
    pub z: u8,
    /// X coordinate (west to east)
    pub x: u32,
    /// Y coordinate (north to south)
    pub y: u32,
}

impl CanonicalTileId {
    /// Creates a validated canonical tile id.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, TileIdError> {
        if z > MAX_ZOOM {
            return Err(TileIdError::InvalidZoom(z));
        }
        let dim = 1u64 << z;
        if u64::from(x) >= dim || u64::from(y) >= dim {
            return Err(TileIdError::OutOfRange { z, x, y, dim });
        }
        Ok(Self { z, x, y })
    }

    /// Number of tiles along one axis at this zoom.
    #[inline]
    pub fn dim(&self) -> u64 {
        1u64 << self.z
    }

    /// Y coordinate flipped for the TMS scheme (origin at the south).
    #[inline]
    pub fn tms_y(&self) -> u32 {
        (self.dim() - 1 - u64::from(self.y)) as u32
    }

    /// Bing-style quadkey for this tile.
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for i in (1..=self.z).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }
}

impl fmt::Display for CanonicalTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A canonical tile possibly rendered at a higher zoom than it is stored at,
/// and possibly repeated across the antimeridian (`wrap`).
///
/// This is the key tiles are identified by throughout the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverscaledTileId {
    /// Zoom the tile is displayed at (>= canonical zoom)
    pub overscaled_z: u8,
    /// World copy index, 0 for the primary world
    pub wrap: i32,
    /// Stored tile coordinates
    pub canonical: CanonicalTileId,
}

impl OverscaledTileId {
    /// Creates a validated overscaled tile id.
    pub fn new(overscaled_z: u8, wrap: i32, z: u8, x: u32, y: u32) -> Result<Self, TileIdError> {
        if overscaled_z < z || overscaled_z > MAX_OVERSCALED_ZOOM {
            return Err(TileIdError::InvalidOverscale { overscaled_z, z });
        }
        Ok(Self {
            overscaled_z,
            wrap,
            canonical: CanonicalTileId::new(z, x, y)?,
        })
    }

    /// Tile id whose display zoom equals its canonical zoom.
    pub fn from_canonical(canonical: CanonicalTileId) -> Self {
        Self {
            overscaled_z: canonical.z,
            wrap: 0,
            canonical,
        }
    }

    /// Scale between the stored tile and its display size.
    #[inline]
    pub fn overscale_factor(&self) -> u32 {
        1u32 << (self.overscaled_z - self.canonical.z)
    }

    /// Returns true if the tile is displayed above its stored zoom.
    #[inline]
    pub fn is_overscaled(&self) -> bool {
        self.overscaled_z > self.canonical.z
    }
}

impl fmt::Display for OverscaledTileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)?;
        if self.is_overscaled() {
            write!(f, "@{}", self.overscaled_z)?;
        }
        if self.wrap != 0 {
            write!(f, "~{}", self.wrap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_rejects_out_of_grid() {
        assert!(CanonicalTileId::new(0, 0, 0).is_ok());
        assert!(matches!(
            CanonicalTileId::new(1, 2, 0),
            Err(TileIdError::OutOfRange { .. })
        ));
        assert!(matches!(
            CanonicalTileId::new(26, 0, 0),
            Err(TileIdError::InvalidZoom(26))
        ));
    }

    #[test]
    fn test_quadkey() {
        let tile = CanonicalTileId::new(3, 3, 5).unwrap();
        assert_eq!(tile.quadkey(), "213");
        assert_eq!(CanonicalTileId::new(0, 0, 0).unwrap().quadkey(), "");
    }

    #[test]
    fn test_tms_y_flips_rows() {
        let tile = CanonicalTileId::new(2, 1, 0).unwrap();
        assert_eq!(tile.tms_y(), 3);
    }

    #[test]
    fn test_overscale_factor() {
        let id = OverscaledTileId::new(16, 0, 14, 100, 200).unwrap();
        assert_eq!(id.overscale_factor(), 4);
        assert!(id.is_overscaled());
        assert!(OverscaledTileId::new(13, 0, 14, 0, 0).is_err());
    }

    #[test]
    fn test_display() {
        let id = OverscaledTileId::new(15, -1, 14, 3, 4).unwrap();
        assert_eq!(id.to_string(), "14/3/4@15~-1");
        let plain = OverscaledTileId::from_canonical(CanonicalTileId::new(2, 1, 1).unwrap());
        assert_eq!(plain.to_string(), "2/1/1");
    }
}
