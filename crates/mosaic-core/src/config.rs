use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, MosaicResult};
use crate::unit::SourceKind;
use crate::viewport::Viewport;

/// How lane pixel data reaches its GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStrategy {
    /// Overwrite texture contents in one driver call per update.
    #[default]
    DirectWrite,
    /// Stage bytes in a pooled scratch buffer, then issue a buffer-to-texture
    /// copy command. Scratch buffers are retained per lane-plane across
    /// frames.
    StagedCopy,
}

/// How encoded draw commands are flushed to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStrategy {
    /// Every lane's draw in one command sequence, flushed once per frame.
    #[default]
    Single,
    /// One independent command sequence per lane. Useful when a driver
    /// limits per-pass binding counts, at a throughput cost.
    PerLane,
}

/// Setup parameters for the compositor actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositorConfig {
    pub stream_count: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub source_kind: SourceKind,
    pub upload_strategy: UploadStrategy,
    pub submission_strategy: SubmissionStrategy,
}

impl CompositorConfig {
    /// Grid layout derived from the stream count and tile size.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.stream_count, self.tile_width, self.tile_height)
    }
}

fn default_frame_rate() -> u32 {
    60
}

/// Full configuration of a compositing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub stream_count: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub upload_strategy: UploadStrategy,
    #[serde(default)]
    pub submission_strategy: SubmissionStrategy,
    /// Animation-frame cadence of the draw loop.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Image served by every lane when `source_kind` is `still-image`.
    #[serde(default)]
    pub still_image: Option<std::path::PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_count: 4,
            tile_width: 320,
            tile_height: 240,
            source_kind: SourceKind::PlanarChunk,
            upload_strategy: UploadStrategy::default(),
            submission_strategy: SubmissionStrategy::default(),
            frame_rate: default_frame_rate(),
            still_image: None,
        }
    }
}

impl SessionConfig {
    /// Reject configurations that cannot produce a frame. Runs before any
    /// actor is spawned.
    pub fn validate(&self) -> MosaicResult<()> {
        if self.stream_count == 0 {
            return Err(MosaicError::unsupported("stream count must be at least 1"));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(MosaicError::unsupported(format!(
                "tile size {}x{} must be non-zero",
                self.tile_width, self.tile_height
            )));
        }
        if self.frame_rate == 0 {
            return Err(MosaicError::unsupported("frame rate must be at least 1"));
        }
        if self.source_kind == SourceKind::StillImage && self.still_image.is_none() {
            return Err(MosaicError::unsupported(
                "still-image source requires a still_image path",
            ));
        }
        Ok(())
    }

    /// Grid layout derived from the stream count and tile size.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.stream_count, self.tile_width, self.tile_height)
    }

    /// The compositor's slice of this configuration.
    pub fn compositor(&self) -> CompositorConfig {
        CompositorConfig {
            stream_count: self.stream_count,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            source_kind: self.source_kind,
            upload_strategy: self.upload_strategy,
            submission_strategy: self.submission_strategy,
        }
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_streams() {
        let config = SessionConfig {
            stream_count: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MosaicError::ConfigUnsupported(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_tile() {
        let config = SessionConfig {
            tile_height: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_still_image_path() {
        let config = SessionConfig {
            source_kind: SourceKind::StillImage,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SessionConfig {
            stream_count: 9,
            upload_strategy: UploadStrategy::StagedCopy,
            submission_strategy: SubmissionStrategy::PerLane,
            ..SessionConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.stream_count, 9);
        assert_eq!(parsed.upload_strategy, UploadStrategy::StagedCopy);
        assert_eq!(parsed.submission_strategy, SubmissionStrategy::PerLane);
    }

    #[test]
    fn test_strategy_defaults_when_omitted() {
        let parsed: SessionConfig = toml::from_str(
            "stream_count = 2\ntile_width = 320\ntile_height = 240\nsource_kind = \"planar-chunk\"\n",
        )
        .unwrap();
        assert_eq!(parsed.upload_strategy, UploadStrategy::DirectWrite);
        assert_eq!(parsed.submission_strategy, SubmissionStrategy::Single);
        assert_eq!(parsed.frame_rate, 60);
    }
}
