//! Settings structs, one per `[section]` of the INI config file.
//!
//! Pure data; parsing lives in [`super::parser`] and serialization in
//! [`super::writer`].

use super::source::SourceConfig;
use crate::dispatch::WorkerPoolConfig;
use crate::error::SourceError;
use crate::fetch::ReqwestFetcher;
use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// HTTP settings
    pub fetch: FetchSettings,
    /// Worker pool settings
    pub workers: WorkerSettings,
    /// Per-tile behaviour
    pub tiles: TileSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Request timeout in seconds
    pub timeout: u64,
    pub user_agent: String,
}

/// `[workers]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Number of worker actors
    pub count: usize,
    /// Mailbox capacity per worker
    pub channel_capacity: usize,
}

/// `[tiles]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSettings {
    pub refresh_expired: bool,
    pub collect_resource_timing: bool,
    pub pixel_ratio: f32,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl ConfigFile {
    /// Runtime flags for sources built from this configuration.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig::new()
            .with_refresh_expired_tiles(self.tiles.refresh_expired)
            .with_collect_resource_timing(self.tiles.collect_resource_timing)
            .with_pixel_ratio(self.tiles.pixel_ratio)
    }

    /// Worker pool configuration.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_workers(self.workers.count)
            .with_channel_capacity(self.workers.channel_capacity)
    }

    /// HTTP fetcher honouring `[fetch]`.
    pub fn fetcher(&self) -> Result<ReqwestFetcher, SourceError> {
        ReqwestFetcher::with_options(self.fetch.timeout, &self.fetch.user_agent)
    }
}
