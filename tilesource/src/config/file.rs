//! Reading and writing `~/.tilesource/config.ini`.

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::settings::ConfigFile;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("cannot write config file: {0}")]
    WriteError(String),

    /// A key holds a value its setting does not accept
    #[error("invalid configuration: {section}.{key} = '{value}' ({reason})")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("cannot create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Reads the user's config file. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        super::parser::parse_ini(&Ini::load_from_file(path)?)
    }

    /// Writes the commented INI form, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        std::fs::write(path, super::writer::to_config_string(self))
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Writes a default config file unless one is present; returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }
}

/// `~/.tilesource`, or `./.tilesource` without a home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilesource")
}

pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
