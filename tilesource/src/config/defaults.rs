//! Default values for all configuration settings and the
//! `ConfigFile::default()` implementation.

use std::path::PathBuf;

use super::settings::*;
use crate::dispatch::{default_worker_count, DEFAULT_CHANNEL_CAPACITY};
use crate::fetch::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT};

// =============================================================================
// Tiles
// =============================================================================

/// Refresh tiles when their cache headers say they expired.
pub const DEFAULT_REFRESH_EXPIRED: bool = true;

/// Resource timing collection is opt-in.
pub const DEFAULT_COLLECT_RESOURCE_TIMING: bool = false;

/// Device pixel ratio used for `{ratio}` templates.
pub const DEFAULT_PIXEL_RATIO: f32 = 1.0;

/// Highest accepted pixel ratio.
pub const MAX_PIXEL_RATIO: f32 = 4.0;

// =============================================================================
// Logging
// =============================================================================

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tilesource.log";

/// Default log directory (~/.tilesource/logs).
pub fn default_log_directory() -> PathBuf {
    super::file::config_directory().join("logs")
}

// =============================================================================
// Default impl
// =============================================================================

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            fetch: FetchSettings {
                timeout: DEFAULT_FETCH_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            workers: WorkerSettings {
                count: default_worker_count(),
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            },
            tiles: TileSettings {
                refresh_expired: DEFAULT_REFRESH_EXPIRED,
                collect_resource_timing: DEFAULT_COLLECT_RESOURCE_TIMING,
                pixel_ratio: DEFAULT_PIXEL_RATIO,
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
