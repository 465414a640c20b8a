//! Argument helpers shared by the source commands.

use clap::Args;
use tilesource::tile::{CanonicalTileId, Scheme};
use tilesource::tilejson::SourceOptions;

use crate::error::CliError;

/// Where the source comes from.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// TileJSON URL, or a tile URL template with --tiles
    pub url: String,

    /// Treat URL as a tile template ({z}/{x}/{y}) instead of a TileJSON URL
    #[arg(long)]
    pub tiles: bool,

    /// Override the tile scheme (xyz or tms)
    #[arg(long)]
    pub scheme: Option<Scheme>,

    /// Override the minimum zoom
    #[arg(long)]
    pub minzoom: Option<u8>,

    /// Override the maximum zoom
    #[arg(long)]
    pub maxzoom: Option<u8>,
}

impl SourceArgs {
    pub fn options(&self) -> SourceOptions {
        let mut options = if self.tiles {
            SourceOptions::from_tiles([self.url.clone()])
        } else {
            SourceOptions::from_url(self.url.clone())
        };
        if let Some(scheme) = self.scheme {
            options = options.with_scheme(scheme);
        }
        if let Some(zoom) = self.minzoom {
            options = options.with_min_zoom(zoom);
        }
        if let Some(zoom) = self.maxzoom {
            options = options.with_max_zoom(zoom);
        }
        options
    }
}

/// Parses `z/x/y`.
pub fn parse_tile(value: &str) -> Result<CanonicalTileId, CliError> {
    let parts: Vec<&str> = value.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(CliError::InvalidTile(format!(
            "expected z/x/y, got '{}'",
            value
        )));
    };

    let number = |name: &str, part: &str| {
        part.trim().parse::<u32>().map_err(|_| {
            CliError::InvalidTile(format!("{} must be a number, got '{}'", name, part))
        })
    };
    let z = number("z", z)?;
    let z = u8::try_from(z)
        .map_err(|_| CliError::InvalidTile(format!("zoom {} is out of range", z)))?;

    CanonicalTileId::new(z, number("x", x)?, number("y", y)?)
        .map_err(|e| CliError::InvalidTile(e.to_string()))
}
