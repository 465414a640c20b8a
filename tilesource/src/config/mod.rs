//! Configuration: the INI config file and per-source runtime flags.
//!
//! # Example
//!
//! ```ignore
//! use tilesource::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let pool_config = config.pool_config();
//! let source_config = config.source_config();
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod source;
mod writer;

pub use defaults::{
    default_log_directory, DEFAULT_COLLECT_RESOURCE_TIMING, DEFAULT_LOG_FILE, DEFAULT_PIXEL_RATIO,
    DEFAULT_REFRESH_EXPIRED, MAX_PIXEL_RATIO,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, FetchSettings, LoggingSettings, TileSettings, WorkerSettings};
pub use source::SourceConfig;
