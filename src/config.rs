//! Server and segmentation configuration.
//!
//! Defaults mirror the deployed configuration this server replaces:
//! preferred port 3193, threshold 0.7, high internal resolution. A JSON
//! config file can override any field; CLI flags override the file.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Preferred listen port tried before falling back to a random one.
pub const DEFAULT_PORT: u16 = 3193;

/// Default segmentation confidence threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Preferred listen port. 0 lets the OS assign one (no conflict
    /// retry ever triggers).
    pub port: u16,
    /// Stop accepting and shut down gracefully after this many frames
    /// across all connections. `None` runs unbounded.
    pub max_frames: Option<u64>,
    /// Upper bound on a single frame's declared size.
    pub max_frame_size: u32,
    /// Default options passed to the segmentation model.
    pub segmentation: SegmentationOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_frames: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            segmentation: SegmentationOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Options forwarded to the segmentation model on every request.
///
/// The confidence threshold here is only the default; each request
/// carries its own override on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentationOptions {
    /// Per-pixel confidence threshold.
    pub threshold: f32,
    /// Mirror the input horizontally before segmenting.
    pub flip_horizontal: bool,
    /// Resolution the model runs at internally.
    pub internal_resolution: InternalResolution,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            flip_horizontal: false,
            internal_resolution: InternalResolution::High,
        }
    }
}

impl SegmentationOptions {
    /// Copy of these options with the threshold replaced by a request's
    /// own value.
    pub fn with_threshold(&self, threshold: f32) -> Self {
        Self {
            threshold,
            ..self.clone()
        }
    }
}

/// Internal model resolution trade-off between speed and mask quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalResolution {
    Low,
    Medium,
    High,
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_values() {
        let config = Config::default();
        assert_eq!(config.port, 3193);
        assert_eq!(config.max_frames, None);
        assert_eq!(config.segmentation.threshold, 0.7);
        assert!(!config.segmentation.flip_horizontal);
        assert_eq!(
            config.segmentation.internal_resolution,
            InternalResolution::High
        );
    }

    #[test]
    fn parse_partial_json() {
        let config: Config = serde_json::from_str(
            r#"{
                "port": 4000,
                "maxFrames": 750,
                "segmentation": { "internalResolution": "medium" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.max_frames, Some(750));
        assert_eq!(
            config.segmentation.internal_resolution,
            InternalResolution::Medium
        );
        // Unspecified fields keep their defaults.
        assert_eq!(config.segmentation.threshold, 0.7);
    }

    #[test]
    fn threshold_override_leaves_rest() {
        let options = SegmentationOptions::default().with_threshold(0.25);
        assert_eq!(options.threshold, 0.25);
        assert!(!options.flip_horizontal);
        assert_eq!(options.internal_resolution, InternalResolution::High);
    }
}
