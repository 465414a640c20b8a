//! tilesource - Vector tile source loading
//!
//! Resolves TileJSON metadata for a vector tile source and drives tile
//! loads through a pool of worker actors, coalescing duplicate network
//! fetches and tracking per-tile lifecycle and expiry.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilesource::dispatch::{PassthroughDecoder, WorkerPool, WorkerPoolConfig};
//! use tilesource::fetch::ReqwestFetcher;
//! use tilesource::source::{SourceContext, VectorTileSource};
//! use tilesource::tile::{OverscaledTileId, Tile};
//! use tilesource::tilejson::SourceOptions;
//!
//! let fetcher = Arc::new(ReqwestFetcher::new()?);
//! let pool = Arc::new(WorkerPool::spawn(
//!     WorkerPoolConfig::default(),
//!     fetcher.clone(),
//!     Arc::new(PassthroughDecoder),
//! ));
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
//! source.load_tile(&tile).await??;
//! ```

pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod source;
pub mod tile;
pub mod tilejson;

pub use error::SourceError;
pub use source::{SourceContext, SourceEvent, SourceStatus, VectorTileSource};

/// Version of the tilesource library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
