//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path`.

use clap::Subcommand;
use tilesource::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Create the config file with defaults if it does not exist
    Init,

    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init => run_init(),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn run_init() -> Result<(), CliError> {
    let existed = config_file_path().exists();
    let path = ConfigFile::ensure_exists()?;
    if existed {
        println!("Config file already exists: {}", path.display());
    } else {
        println!("Created {}", path.display());
    }
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    print!("{}", render(&config));
    Ok(())
}

fn render(config: &ConfigFile) -> String {
    let rows: [(&str, &str, String); 9] = [
        ("fetch", "timeout", config.fetch.timeout.to_string()),
        ("fetch", "user_agent", config.fetch.user_agent.clone()),
        ("workers", "count", config.workers.count.to_string()),
        (
            "workers",
            "channel_capacity",
            config.workers.channel_capacity.to_string(),
        ),
        (
            "tiles",
            "refresh_expired",
            config.tiles.refresh_expired.to_string(),
        ),
        (
            "tiles",
            "collect_resource_timing",
            config.tiles.collect_resource_timing.to_string(),
        ),
        ("tiles", "pixel_ratio", config.tiles.pixel_ratio.to_string()),
        (
            "logging",
            "directory",
            config.logging.directory.display().to_string(),
        ),
        ("logging", "file", config.logging.file.clone()),
    ];

    let mut out = String::new();
    let mut current_section = "";
    for (section, key, value) in rows {
        if section != current_section {
            if !current_section.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            current_section = section;
        }
        out.push_str(&format!("{} = {}\n", key, value));
    }
    out
}
