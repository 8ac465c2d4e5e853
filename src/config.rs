//! Conversion settings.
//!
//! Everything here is fixed for the duration of one conversion.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The size of one frame in bits, before any upscaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameResolution {
    width: u32,
    height: u32,
}

impl FrameResolution {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyResolution { width, height });
        }
        if (width as u64 * height as u64) % 8 != 0 {
            return Err(ConfigError::UnalignedResolution { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// How many file bytes one frame carries.
    pub fn bytes_per_image(&self) -> usize {
        self.width as usize * self.height as usize / 8
    }

    /// Pixel dimensions of the frame as stored in the video.
    ///
    /// A `scale` of `0` means the frame is not scaled.
    pub fn scaled(&self, scale: u32) -> (u32, u32) {
        let scale = scale.max(1);
        (self.width * scale, self.height * scale)
    }
}

/// User-facing settings, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Width of the video before the resize factor is applied.
    pub base_width: u32,
    /// Height of the video before the resize factor is applied.
    pub base_height: u32,
    /// Every bit is drawn as a `resize_factor` x `resize_factor` block.
    ///
    /// Set to `0` to draw one pixel per bit. Unscaled videos read back
    /// perfectly but don't survive lossy re-encoding well.
    pub resize_factor: u32,
    pub fps: u32,
    /// Pixels brighter than this decode as `1`.
    pub threshold: u8,
    /// Frames decoded concurrently between two ordered writes.
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_width: 1280,
            base_height: 720,
            resize_factor: 4,
            fps: 30,
            threshold: 128,
            batch_size: 64,
        }
    }
}

impl Settings {
    /// The bit resolution of each frame, derived from the base size and
    /// the resize factor.
    pub fn resolution(&self) -> Result<FrameResolution, ConfigError> {
        match self.resize_factor {
            0 => FrameResolution::new(self.base_width, self.base_height),
            factor => FrameResolution::new(self.base_width / factor, self.base_height / factor),
        }
    }

    pub fn validate(&self) -> Result<FrameResolution, ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.resolution()
    }

    /// Load settings from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let text = Self::default().to_toml()?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[test]
    fn default_resolution() {
        let res = Settings::default().validate().unwrap();
        assert_eq!((res.width(), res.height()), (320, 180));
        assert_eq!(res.bytes_per_image(), 7200);
        assert_eq!(res.scaled(4), (1280, 720));
    }

    #[rstest]
    #[case::unscaled(0, (1280, 720))]
    #[case::halved(2, (640, 360))]
    #[case::quartered(4, (320, 180))]
    fn resolution_from_factor(#[case] factor: u32, #[case] expected: (u32, u32)) {
        let settings = Settings {
            resize_factor: factor,
            ..Settings::default()
        };
        let res = settings.resolution().unwrap();
        assert_eq!((res.width(), res.height()), expected);
        assert_eq!(res.scaled(factor), (1280, 720));
    }

    #[rstest]
    #[case::zero_width(0, 8)]
    #[case::odd_bits(3, 3)]
    fn rejects_bad_resolution(#[case] width: u32, #[case] height: u32) {
        assert!(FrameResolution::new(width, height).is_err());
    }

    #[test]
    fn rejects_zero_batch_and_fps() {
        let settings = Settings {
            batch_size: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::ZeroBatchSize)));

        let settings = Settings {
            fps: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::ZeroFps)));
    }

    #[test]
    fn roundtrip_config() {
        let text = Settings::default().to_toml().unwrap();
        assert!(text.contains("batch_size"));
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let parsed: Settings = toml::from_str("resize_factor = 0\nthreshold = 100\n").unwrap();
        assert_eq!(parsed.resize_factor, 0);
        assert_eq!(parsed.threshold, 100);
        assert_eq!(parsed.batch_size, 64);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let settings = Settings::load(Path::new("./target/does-not-exist/bitvid.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn written_default_loads_back() {
        let dir = Path::new("./target/test-config");
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("bitvid.toml");

        Settings::write_default(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn garbage_config_is_an_error() {
        let dir = Path::new("./target/test-config");
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("garbage.toml");
        std::fs::write(&path, "batch_size = \"lots\"\n").unwrap();

        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse(_))));
    }
}
