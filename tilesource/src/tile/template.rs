//! Tile URL template expansion.
//!
//! Supported placeholders: `{z}`, `{x}`, `{y}`, `{quadkey}`, `{prefix}` and
//! `{ratio}`. When a source lists several templates, the one used for a tile
//! is picked by `(x + y) % templates.len()` so that neighbouring tiles spread
//! across hosts.

use super::id::CanonicalTileId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row numbering scheme of a tile source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Row 0 at the north edge (slippy map)
    #[default]
    Xyz,
    /// Row 0 at the south edge
    Tms,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Xyz => write!(f, "xyz"),
            Scheme::Tms => write!(f, "tms"),
        }
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xyz" => Ok(Scheme::Xyz),
            "tms" => Ok(Scheme::Tms),
            other => Err(format!("unknown tile scheme '{}'", other)),
        }
    }
}

/// Expands the template that serves `tile`.
///
/// Returns `None` when `templates` is empty.
pub fn tile_url(
    templates: &[String],
    tile: &CanonicalTileId,
    scheme: Scheme,
    pixel_ratio: f32,
) -> Option<String> {
    if templates.is_empty() {
        return None;
    }
    let index = ((u64::from(tile.x) + u64::from(tile.y)) % templates.len() as u64) as usize;
    let template = &templates[index];

    let y = match scheme {
        Scheme::Xyz => tile.y,
        Scheme::Tms => tile.tms_y(),
    };
    let prefix = format!("{:x}{:x}", tile.x % 16, tile.y % 16);
    let ratio = if pixel_ratio >= 2.0 { "@2x" } else { "" };

    let mut url = template
        .replace("{prefix}", &prefix)
        .replace("{z}", &tile.z.to_string())
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &y.to_string())
        .replace("{ratio}", ratio);
    if url.contains("{quadkey}") {
        url = url.replace("{quadkey}", &tile.quadkey());
    }
    Some(url)
}
