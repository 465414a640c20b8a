//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;
use tilesource::config::ConfigFileError;
use tilesource::SourceError;

/// Exit code for usage errors (bad tile coordinates and the like).
const EXIT_USAGE: i32 = 2;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Invalid tile coordinate argument
    InvalidTile(String),
    /// Metadata could not be resolved
    Metadata(SourceError),
    /// Tile load failed
    Tile(SourceError),
    /// Interrupted by the user
    Interrupted,
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidTile(_) => EXIT_USAGE,
            CliError::Interrupted => 130,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Metadata(SourceError::Network { .. })
            | CliError::Tile(SourceError::Network { .. }) => {
                eprintln!();
                eprintln!("Check the URL and your network connection. Request");
                eprintln!("timeouts can be raised with: [fetch] timeout in the config file");
            }
            CliError::Metadata(SourceError::Parse(_)) => {
                eprintln!();
                eprintln!("The URL must point at a TileJSON document. To use tile");
                eprintln!("templates directly, pass --tiles.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidTile(msg) => write!(f, "Invalid tile: {}", msg),
            CliError::Metadata(e) => write!(f, "Failed to load source metadata: {}", e),
            CliError::Tile(e) => write!(f, "Failed to load tile: {}", e),
            CliError::Interrupted => write!(f, "Interrupted"),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Metadata(e) | CliError::Tile(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::InvalidTile("x".into()).exit_code(), EXIT_USAGE);
        assert_eq!(CliError::Interrupted.exit_code(), 130);
        assert_eq!(CliError::Tile(SourceError::Cancelled).exit_code(), 1);
    }

    #[test]
    fn test_display_wraps_source_error() {
        let err = CliError::Tile(SourceError::NotFound {
            url: "https://t.example.com/1/0/0.pbf".into(),
        });
        let message = err.to_string();
        assert!(message.starts_with("Failed to load tile"));
        assert!(message.contains("https://t.example.com/1/0/0.pbf"));
    }
}
