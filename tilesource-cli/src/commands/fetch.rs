//! `fetch` command: load one tile through the worker pool.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tilesource::tile::{OverscaledTileId, Tile, TileLoadOutcome};
use tracing::info;

use super::common::{parse_tile, SourceArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Tile coordinate as z/x/y
    pub tile: String,

    /// Write the tile body to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub async fn run(runner: &CliRunner, args: FetchArgs) -> Result<(), CliError> {
    let canonical = parse_tile(&args.tile)?;
    runner.log_startup("fetch");

    let source = runner.create_source(args.source.options())?;
    let descriptor = runner.load_source(&source).await?;
    let tile = Arc::new(Tile::new(OverscaledTileId::from_canonical(canonical)));

    if !source.has_tile(&tile) {
        println!(
            "Tile {} is outside the source (zoom {}-{}); requesting anyway",
            canonical, descriptor.min_zoom, descriptor.max_zoom
        );
    }
    if let Some(url) = descriptor.tile_url(&canonical, runner.config().tiles.pixel_ratio) {
        println!("Fetching {}", url);
    }

    let rx = source.load_tile(&tile);
    let result = tokio::select! {
        _ = runner.interrupt().cancelled() => {
            source.abort_tile(&tile);
            return Err(CliError::Interrupted);
        }
        result = rx => result.map_err(|_| CliError::Tile(tilesource::SourceError::Cancelled))?,
    };

    match result.map_err(CliError::Tile)? {
        TileLoadOutcome::Loaded => {}
        outcome => {
            info!(tile = %canonical, outcome = ?outcome, "Tile load did not complete");
            return Err(CliError::Interrupted);
        }
    }

    let Some(data) = tile.data() else {
        println!("Tile {} is empty", canonical);
        return Ok(());
    };

    println!(
        "Tile {}: {} bytes{}",
        canonical,
        data.len(),
        if data.gzipped { " (gzip)" } else { "" }
    );
    if let Some(timeout) = tile.expiry_timeout() {
        println!("  Expires in {}s", timeout.as_secs());
    }
    for timing in tile.resource_timing() {
        println!("  Fetched {} in {:?}", timing.url, timing.duration);
    }

    if let Some(path) = args.output {
        std::fs::write(&path, &data.data).map_err(|error| CliError::FileWrite {
            path: path.display().to_string(),
            error,
        })?;
        info!(path = %path.display(), bytes = data.len(), "Tile written");
        println!("Saved to {}", path.display());
    }

    Ok(())
}
