//! TileJSON metadata: document types, option merging and loading.
//!
//! # Example
//!
//! ```ignore
//! use tilesource::tilejson::{load_tilejson, MetadataContext, SourceOptions};
//!
//! let request = load_tilejson(
//!     SourceOptions::from_url("https://tiles.example.com/streets.json").with_min_zoom(3),
//!     MetadataContext::new(fetcher),
//! );
//! let descriptor = request.wait().await?;
//! ```

mod loader;
mod types;

pub use loader::{canonicalize_template, load_tilejson, MetadataContext, MetadataRequest};
pub use types::{
    SourceDescriptor, SourceOptions, TileJson, VectorLayer, DEFAULT_ENCODING, DEFAULT_MAX_ZOOM,
    DEFAULT_MIN_ZOOM, DEFAULT_TILE_SIZE, MAX_TILE_SIZE,
};
