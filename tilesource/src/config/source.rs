//! Per-source runtime flags.

use super::defaults::{
    DEFAULT_COLLECT_RESOURCE_TIMING, DEFAULT_PIXEL_RATIO, DEFAULT_REFRESH_EXPIRED,
};

/// Runtime flags passed to a source's coordinator.
///
/// # Example
///
/// ```
/// use tilesource::config::SourceConfig;
///
/// let config = SourceConfig::new()
///     .with_pixel_ratio(2.0)
///     .with_collect_resource_timing(true);
/// assert!(config.refresh_expired_tiles());
/// assert_eq!(config.pixel_ratio(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceConfig {
    /// Apply response cache headers to tiles so they can be refreshed
    refresh_expired_tiles: bool,
    /// Ask workers to report request timing
    collect_resource_timing: bool,
    pixel_ratio: f32,
    /// Forwarded to workers for debug rendering
    show_collision_boxes: bool,
}

impl SourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh_expired_tiles(mut self, enabled: bool) -> Self {
        self.refresh_expired_tiles = enabled;
        self
    }

    pub fn with_collect_resource_timing(mut self, enabled: bool) -> Self {
        self.collect_resource_timing = enabled;
        self
    }

    /// Sets the device pixel ratio. Non-positive or non-finite values fall
    /// back to 1.0.
    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            DEFAULT_PIXEL_RATIO
        };
        self
    }

    pub fn with_show_collision_boxes(mut self, enabled: bool) -> Self {
        self.show_collision_boxes = enabled;
        self
    }

    pub fn refresh_expired_tiles(&self) -> bool {
        self.refresh_expired_tiles
    }

    pub fn collect_resource_timing(&self) -> bool {
        self.collect_resource_timing
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn show_collision_boxes(&self) -> bool {
        self.show_collision_boxes
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            refresh_expired_tiles: DEFAULT_REFRESH_EXPIRED,
            collect_resource_timing: DEFAULT_COLLECT_RESOURCE_TIMING,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            show_collision_boxes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SourceConfig::default();
        assert!(config.refresh_expired_tiles());
        assert!(!config.collect_resource_timing());
        assert_eq!(config.pixel_ratio(), 1.0);
        assert!(!config.show_collision_boxes());
    }

    #[test]
    fn test_invalid_pixel_ratio_falls_back() {
        assert_eq!(SourceConfig::new().with_pixel_ratio(0.0).pixel_ratio(), 1.0);
        assert_eq!(SourceConfig::new().with_pixel_ratio(f32::NAN).pixel_ratio(), 1.0);
        assert_eq!(SourceConfig::new().with_pixel_ratio(3.0).pixel_ratio(), 3.0);
    }
}
