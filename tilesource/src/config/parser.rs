//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::MAX_PIXEL_RATIO;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [fetch] section
    if let Some(section) = ini.section(Some("fetch")) {
        if let Some(v) = section.get("timeout") {
            let timeout: u64 = parse_value("fetch", "timeout", v, "must be a positive integer (seconds)")?;
            if timeout == 0 {
                return Err(invalid("fetch", "timeout", v, "must be at least 1 second"));
            }
            config.fetch.timeout = timeout;
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                config.fetch.user_agent = v.to_string();
            }
        }
    }

    // [workers] section
    if let Some(section) = ini.section(Some("workers")) {
        if let Some(v) = section.get("count") {
            let count: usize = parse_value("workers", "count", v, "must be a positive integer")?;
            if count == 0 {
                return Err(invalid("workers", "count", v, "must be at least 1"));
            }
            config.workers.count = count;
        }
        if let Some(v) = section.get("channel_capacity") {
            let capacity: usize =
                parse_value("workers", "channel_capacity", v, "must be a positive integer")?;
            if capacity == 0 {
                return Err(invalid("workers", "channel_capacity", v, "must be at least 1"));
            }
            config.workers.channel_capacity = capacity;
        }
    }

    // [tiles] section
    if let Some(section) = ini.section(Some("tiles")) {
        if let Some(v) = section.get("refresh_expired") {
            config.tiles.refresh_expired = parse_bool("tiles", "refresh_expired", v)?;
        }
        if let Some(v) = section.get("collect_resource_timing") {
            config.tiles.collect_resource_timing =
                parse_bool("tiles", "collect_resource_timing", v)?;
        }
        if let Some(v) = section.get("pixel_ratio") {
            let ratio: f32 = parse_value("tiles", "pixel_ratio", v, "must be a number")?;
            if !(ratio > 0.0 && ratio <= MAX_PIXEL_RATIO) {
                return Err(invalid(
                    "tiles",
                    "pixel_ratio",
                    v,
                    &format!("must be greater than 0 and at most {}", MAX_PIXEL_RATIO),
                ));
            }
            config.tiles.pixel_ratio = ratio;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
