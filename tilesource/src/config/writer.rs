//! INI serialization: `ConfigFile` → commented INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[fetch]
; HTTP request timeout in seconds (default: 30)
timeout = {}
; User-Agent header sent with every request
user_agent = {}

[workers]
; Number of worker actors decoding tiles (default: CPU count, max 16)
count = {}
; Mailbox capacity per worker (default: 256)
channel_capacity = {}

[tiles]
; Apply Cache-Control / Expires headers so tiles are refreshed when stale
refresh_expired = {}
; Record per-tile request timing
collect_resource_timing = {}
; Device pixel ratio; 2 or more selects @2x tiles for {{ratio}} templates
pixel_ratio = {}

[logging]
; Directory for log files
directory = {}
; Log file name
file = {}
"#,
        config.fetch.timeout,
        config.fetch.user_agent,
        config.workers.count,
        config.workers.channel_capacity,
        config.tiles.refresh_expired,
        config.tiles.collect_resource_timing,
        config.tiles.pixel_ratio,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_contains_every_section() {
        let content = to_config_string(&ConfigFile::default());
        for section in ["[fetch]", "[workers]", "[tiles]", "[logging]"] {
            assert!(content.contains(section), "missing {}", section);
        }
        assert!(content.contains("refresh_expired = true"));
        assert!(content.contains("{ratio}"));
    }
}
