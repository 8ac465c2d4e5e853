//! Byte buffer <-> grayscale frame conversion.
//!
//! A frame carries exactly [`FrameResolution::bytes_per_image`] bytes, one bit
//! per pixel, row-major and most significant bit first. Set bits are drawn
//! white (`255`) and unset bits black (`0`). When a scale is configured every
//! bit becomes a `scale` x `scale` block of identical pixels.
//!
//! Reading a frame back samples the centre of each block and compares it
//! against a threshold, so mild noise from lossy re-encoding still decodes to
//! the same bits.

use bitgrid::BitGrid;
use image::{GrayImage, Luma};

use crate::config::{FrameResolution, Settings};
use crate::error::{CodecError, ConfigError};

pub const BLACK: Luma<u8> = Luma([0x00]);
pub const WHITE: Luma<u8> = Luma([0xFF]);

pub const DEFAULT_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    resolution: FrameResolution,
    scale: u32,
    threshold: u8,
}

impl FrameCodec {
    pub fn new(resolution: FrameResolution, scale: u32, threshold: u8) -> Self {
        Self {
            resolution,
            scale,
            threshold,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            settings.resolution()?,
            settings.resize_factor,
            settings.threshold,
        ))
    }

    pub fn resolution(&self) -> FrameResolution {
        self.resolution
    }

    pub fn bytes_per_image(&self) -> usize {
        self.resolution.bytes_per_image()
    }

    /// Pixel dimensions of every frame this codec produces and accepts.
    pub fn frame_dims(&self) -> (u32, u32) {
        self.resolution.scaled(self.scale)
    }

    /// Draws `bytes` as a frame, right-padding with zero bytes if it is short.
    pub fn encode(&self, bytes: &[u8]) -> Result<GrayImage, CodecError> {
        let (width, height) = (self.resolution.width(), self.resolution.height());
        let grid = BitGrid::from_bytes(width as usize, height as usize, bytes).ok_or(
            CodecError::ChunkTooLarge {
                len: bytes.len(),
                max: self.bytes_per_image(),
            },
        )?;

        Ok(render(&grid, self.scale))
    }

    /// Reads the bits back out of a frame.
    ///
    /// Always returns exactly `bytes_per_image` bytes. Padding added by
    /// [`encode`](Self::encode) comes back as trailing zero bytes.
    pub fn decode(&self, image: &GrayImage) -> Result<Vec<u8>, CodecError> {
        let expected = self.frame_dims();
        if image.dimensions() != expected {
            return Err(CodecError::DimensionMismatch {
                expected,
                actual: image.dimensions(),
            });
        }

        Ok(sample(image, self.resolution, self.scale, self.threshold).into_bytes())
    }
}

/// `true` iff `value` is strictly brighter than `threshold`.
pub fn decode_bit(value: u8, threshold: u8) -> bool {
    value > threshold
}

/// Upscales `grid` by `scale` with nearest-neighbour block fill.
pub fn render(grid: &BitGrid, scale: u32) -> GrayImage {
    let scale = scale.max(1);
    let width = grid.width() as u32 * scale;
    let height = grid.height() as u32 * scale;

    GrayImage::from_fn(width, height, |x, y| {
        if grid.get((x / scale) as usize, (y / scale) as usize) {
            WHITE
        } else {
            BLACK
        }
    })
}

/// Downscales `image` to `resolution` by sampling the centre pixel of each
/// `scale` x `scale` block, then thresholds it to a bit.
///
/// # Panics
///
/// Panics if `image` is smaller than `resolution` scaled by `scale`.
pub fn sample(image: &GrayImage, resolution: FrameResolution, scale: u32, threshold: u8) -> BitGrid {
    let scale = scale.max(1);
    let offset = scale / 2;
    let mut grid = BitGrid::new(resolution.width() as usize, resolution.height() as usize);

    for y in 0..resolution.height() {
        for x in 0..resolution.width() {
            let Luma([value]) = *image.get_pixel(x * scale + offset, y * scale + offset);
            grid.set(x as usize, y as usize, decode_bit(value, threshold));
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    fn codec(width: u32, height: u32, scale: u32) -> FrameCodec {
        FrameCodec::new(
            FrameResolution::new(width, height).unwrap(),
            scale,
            DEFAULT_THRESHOLD,
        )
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[rstest]
    #[case::unscaled(0)]
    #[case::one(1)]
    #[case::two(2)]
    #[case::four(4)]
    fn round_trip_full_frame(#[case] scale: u32) {
        let codec = codec(16, 8, scale);
        let bytes = pattern(codec.bytes_per_image());

        let frame = codec.encode(&bytes).unwrap();
        assert_eq!(frame.dimensions(), codec.frame_dims());
        assert_eq!(codec.decode(&frame).unwrap(), bytes);
    }

    #[test]
    fn short_chunk_is_zero_padded() {
        let codec = codec(8, 8, 2);
        let frame = codec.encode(&[0xAB, 0xCD, 0xEF]).unwrap();

        let mut expected = vec![0xAB, 0xCD, 0xEF];
        expected.resize(8, 0);
        assert_eq!(codec.decode(&frame).unwrap(), expected);
    }

    #[test]
    fn bits_are_msb_first_and_white_is_set() {
        let codec = codec(8, 1, 0);
        let frame = codec.encode(&[0b1000_0001]).unwrap();

        let pixels: Vec<u8> = frame.pixels().map(|p| p.0[0]).collect();
        assert_eq!(pixels, vec![255, 0, 0, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn encoded_pixels_are_pure_black_or_white() {
        let codec = codec(32, 4, 3);
        let frame = codec.encode(&pattern(16)).unwrap();
        assert!(frame.pixels().all(|p| *p == BLACK || *p == WHITE));
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let codec = codec(8, 1, 0);
        assert_eq!(
            codec.encode(&[0, 0]),
            Err(CodecError::ChunkTooLarge { len: 2, max: 1 })
        );
    }

    #[test]
    fn wrong_dimensions_are_rejected() {
        let codec = codec(8, 8, 4);
        let frame = GrayImage::new(8, 8);
        assert_eq!(
            codec.decode(&frame),
            Err(CodecError::DimensionMismatch {
                expected: (32, 32),
                actual: (8, 8),
            })
        );
    }

    #[rstest]
    #[case::black(0, false)]
    #[case::below(127, false)]
    #[case::boundary(128, false)]
    #[case::above(129, true)]
    #[case::white(255, true)]
    fn threshold_rule(#[case] value: u8, #[case] expected: bool) {
        assert_eq!(decode_bit(value, DEFAULT_THRESHOLD), expected);
    }

    #[test]
    fn threshold_is_monotonic() {
        for threshold in [0_u8, 1, 64, 128, 200, 255] {
            for value in 0..=255_u8 {
                assert_eq!(decode_bit(value, threshold), value > threshold);
            }
        }
    }

    #[rstest]
    fn scale_round_trip(#[values(0, 1, 2, 4)] scale: u32, #[values(false, true)] bit: bool) {
        let resolution = FrameResolution::new(8, 1).unwrap();
        let mut grid = BitGrid::new(8, 1);
        for x in 0..8 {
            grid.set(x, 0, bit);
        }

        let image = render(&grid, scale);
        assert_eq!(sample(&image, resolution, scale, DEFAULT_THRESHOLD), grid);
    }

    #[test]
    fn survives_noise_within_threshold_margin() {
        let codec = codec(16, 16, 4);
        let bytes = pattern(codec.bytes_per_image());
        let mut frame = codec.encode(&bytes).unwrap();

        // Pull every pixel towards mid-grey, as a lossy re-encode might
        for (i, pixel) in frame.pixels_mut().enumerate() {
            let jitter = (i % 97) as u8;
            pixel.0[0] = if pixel.0[0] == 255 {
                255 - jitter
            } else {
                jitter
            };
        }

        assert_eq!(codec.decode(&frame).unwrap(), bytes);
    }

    #[test]
    fn block_centre_is_the_sampling_point() {
        let codec = codec(8, 1, 4);
        let mut frame = codec.encode(&[0xFF]).unwrap();

        // Darken everything but the centre pixel of the first block
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            if x < 4 && (x, y) != (2, 2) {
                *pixel = BLACK;
            }
        }

        assert_eq!(codec.decode(&frame).unwrap(), vec![0xFF]);
    }
}
