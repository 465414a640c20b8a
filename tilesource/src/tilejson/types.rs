//! TileJSON documents, user-supplied source options, and the resolved
//! source descriptor.

use crate::error::SourceError;
use crate::tile::{tile_url, CanonicalTileId, OverscaledTileId, Scheme, TileBounds, WORLD_BOUNDS};
use serde::{Deserialize, Serialize};

/// Default minimum zoom.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Default maximum zoom.
pub const DEFAULT_MAX_ZOOM: u8 = 22;

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Largest accepted tile size in pixels.
pub const MAX_TILE_SIZE: u32 = 8192;

/// Default tile encoding.
pub const DEFAULT_ENCODING: &str = "mvt";

/// A TileJSON document. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    #[serde(
        rename = "tileSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoomoffset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<Vec<VectorLayer>>,
}

/// Entry of the TileJSON `vector_layers` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorLayer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,
}

/// Options a user supplies when adding a vector source.
///
/// Either `url` (a TileJSON endpoint) or `tiles` (explicit templates) must be
/// set. Every other field overrides the same-named TileJSON field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoomoffset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote_id: Option<String>,
}

impl SourceOptions {
    /// Options for a TileJSON endpoint.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Options with explicit tile templates.
    pub fn from_tiles<I, S>(tiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tiles: Some(tiles.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_min_zoom(mut self, zoom: u8) -> Self {
        self.minzoom = Some(zoom);
        self
    }

    pub fn with_max_zoom(mut self, zoom: u8) -> Self {
        self.maxzoom = Some(zoom);
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn with_bounds(mut self, bounds: [f64; 4]) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    pub fn with_promote_id(mut self, promote_id: impl Into<String>) -> Self {
        self.promote_id = Some(promote_id.into());
        self
    }
}

/// Resolved, immutable description of a vector source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub tiles: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub scheme: Scheme,
    pub tile_size: u32,
    pub bounds: TileBounds,
    pub attribution: Option<String>,
    pub encoding: String,
    pub zoom_offset: i32,
    /// Layer ids from `vector_layers`, when the TileJSON lists them
    pub vector_layer_ids: Option<Vec<String>>,
    pub promote_id: Option<String>,
}

impl SourceDescriptor {
    /// Merges explicit options with fetched TileJSON. Options win.
    pub fn resolve(
        options: &SourceOptions,
        fetched: Option<TileJson>,
    ) -> Result<Self, SourceError> {
        let fetched = fetched.unwrap_or_default();

        let min_zoom = options.minzoom.or(fetched.minzoom).unwrap_or(DEFAULT_MIN_ZOOM);
        let max_zoom = options.maxzoom.or(fetched.maxzoom).unwrap_or(DEFAULT_MAX_ZOOM);
        if min_zoom > max_zoom {
            return Err(SourceError::Parse(format!(
                "minzoom {} is greater than maxzoom {}",
                min_zoom, max_zoom
            )));
        }

        let tile_size = options
            .tile_size
            .or(fetched.tile_size)
            .unwrap_or(DEFAULT_TILE_SIZE);
        if tile_size == 0 || tile_size > MAX_TILE_SIZE {
            return Err(SourceError::Parse(format!(
                "tileSize {} is outside 1..={}",
                tile_size, MAX_TILE_SIZE
            )));
        }

        let bounds = options.bounds.or(fetched.bounds).unwrap_or(WORLD_BOUNDS);
        let vector_layer_ids = fetched
            .vector_layers
            .map(|layers| layers.into_iter().map(|layer| layer.id).collect());

        Ok(Self {
            tiles: options.tiles.clone().or(fetched.tiles).unwrap_or_default(),
            min_zoom,
            max_zoom,
            scheme: options.scheme.or(fetched.scheme).unwrap_or_default(),
            tile_size,
            bounds: TileBounds::new(bounds, min_zoom, max_zoom),
            attribution: options.attribution.clone().or(fetched.attribution),
            encoding: options
                .encoding
                .clone()
                .or(fetched.encoding)
                .unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            zoom_offset: options.zoomoffset.or(fetched.zoomoffset).unwrap_or(0),
            vector_layer_ids,
            promote_id: options.promote_id.clone(),
        })
    }

    /// Request URL for a tile, `None` if the source has no templates.
    pub fn tile_url(&self, tile: &CanonicalTileId, pixel_ratio: f32) -> Option<String> {
        tile_url(&self.tiles, tile, self.scheme, pixel_ratio)
    }

    /// Returns true if the source serves `tile`.
    pub fn has_tile(&self, tile: &OverscaledTileId) -> bool {
        self.bounds.contains(&tile.canonical)
    }
}
