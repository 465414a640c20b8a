//! Tile payload decoding seam.
//!
//! Vector-tile parsing is outside this crate. Workers hand raw bytes to a
//! [`TileDecoder`] on the blocking thread pool and forward whatever it
//! produces.

use super::message::TileParams;
use crate::error::SourceError;
use bytes::Bytes;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decoded tile contents handed to the tile entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    /// Payload as produced by the decoder
    pub data: Bytes,
    /// True if the raw response was gzip-compressed
    pub gzipped: bool,
}

impl DecodedTile {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Converts raw tile bytes into a [`DecodedTile`].
///
/// Called on the blocking pool, so implementations may do CPU-heavy work.
/// Returns `Ok(None)` for a tile with no content.
pub trait TileDecoder: Send + Sync + 'static {
    fn decode(&self, raw: &Bytes, params: &TileParams) -> Result<Option<DecodedTile>, SourceError>;
}

/// Decoder that keeps the payload as-is.
///
/// An empty body is an empty tile; a truncated gzip stream is a parse error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl TileDecoder for PassthroughDecoder {
    fn decode(&self, raw: &Bytes, params: &TileParams) -> Result<Option<DecodedTile>, SourceError> {
        if raw.is_empty() {
            return Ok(None);
        }
        let gzipped = raw.starts_with(&GZIP_MAGIC);
        // A gzip member is at least a 10-byte header plus an 8-byte trailer
        if gzipped && raw.len() < 18 {
            return Err(SourceError::Parse(format!(
                "truncated gzip payload for tile {} ({} bytes)",
                params.tile_id,
                raw.len()
            )));
        }
        Ok(Some(DecodedTile {
            data: raw.clone(),
            gzipped,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetch::Request;
    use crate::tile::OverscaledTileId;

    pub(crate) fn params() -> TileParams {
        let tile_id = OverscaledTileId::new(3, 0, 3, 1, 2).unwrap();
        TileParams {
            request: Request::new("https://t.example.com/3/1/2.pbf"),
            data: None,
            uid: 7,
            tile_id,
            tile_zoom: 3,
            zoom: 3,
            tile_size: 512,
            source_type: "vector".to_string(),
            source: "streets".to_string(),
            pixel_ratio: 1.0,
            show_collision_boxes: false,
            promote_id: None,
            is_symbol_tile: false,
            collect_resource_timing: false,
        }
    }

    #[test]
    fn test_passthrough_keeps_bytes() {
        let decoded = PassthroughDecoder
            .decode(&Bytes::from_static(b"\x1a\x02ab"), &params())
            .unwrap()
            .unwrap();
        assert_eq!(&decoded.data[..], b"\x1a\x02ab");
        assert!(!decoded.gzipped);
    }

    #[test]
    fn test_passthrough_empty_body_is_empty_tile() {
        assert_eq!(PassthroughDecoder.decode(&Bytes::new(), &params()), Ok(None));
    }

    #[test]
    fn test_passthrough_rejects_truncated_gzip() {
        let err = PassthroughDecoder
            .decode(&Bytes::from_static(&[0x1f, 0x8b, 0x08]), &params())
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
