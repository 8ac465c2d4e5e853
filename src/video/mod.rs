//! Where frames go after encoding and come from before decoding.
//!
//! The pipelines only see [`FrameSink`] and [`FrameSource`]. Containers are
//! kept deliberately simple so they can be handed to a real video toolchain:
//!
//! | Adapter           | Format                                              |
//! |-------------------|-----------------------------------------------------|
//! | [`Y4mWriter`]     | YUV4MPEG2, greyscale (`Cmono`)                      |
//! | [`Y4mReader`]     | YUV4MPEG2, `mono` or any 8-bit 4:2:0/4:2:2/4:4:4    |
//! | [`PngFrameWriter`]| a directory of `frame_000000.png`, ...              |
//! | [`PngFrameReader`]| a directory of numbered PNGs, any colour type       |
//! | [`FfmpegWriter`]  | `.mp4`/`.mov` (H.264) or `.mkv` (FFV1) via `ffmpeg` |
//! | [`FfmpegReader`]  | anything `ffmpeg` can decode                        |
//! | [`MemoryVideo`]   | frames kept in memory                               |

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use image::GrayImage;

use crate::error::VideoError;

pub mod ffmpeg;
pub mod memory;
pub mod png_dir;
pub mod y4m;

pub use ffmpeg::{FfmpegReader, FfmpegWriter};
pub use memory::MemoryVideo;
pub use png_dir::{PngFrameReader, PngFrameWriter};
pub use y4m::{Y4mReader, Y4mWriter};

/// Accepts frames in final playback order.
pub trait FrameSink {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError>;

    /// Flushes anything buffered. Called once after the last frame.
    fn finish(&mut self) -> Result<(), VideoError>;
}

/// Yields frames in their original order, then `None`.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError> {
        (**self).append(frame)
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        (**self).finish()
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError> {
        (**self).next_frame()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Y4m,
    Ffmpeg,
    PngFrames,
}

impl VideoFormat {
    /// Picks the format from the extension. Existing directories and paths
    /// without an extension are frame directories.
    pub fn from_path(path: &Path) -> Result<Self, VideoError> {
        if path.is_dir() {
            return Ok(VideoFormat::PngFrames);
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            None => Ok(VideoFormat::PngFrames),
            Some(ext) if ext.eq_ignore_ascii_case("y4m") => Ok(VideoFormat::Y4m),
            Some(ext)
                if ffmpeg::EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known)) =>
            {
                Ok(VideoFormat::Ffmpeg)
            }
            Some(_) => Err(VideoError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Creates the video at `path`, in the format its name implies.
pub fn create_sink(
    path: &Path,
    dims: (u32, u32),
    fps: u32,
) -> Result<Box<dyn FrameSink>, VideoError> {
    match VideoFormat::from_path(path)? {
        VideoFormat::Y4m => {
            let file = BufWriter::new(File::create(path)?);
            Ok(Box::new(Y4mWriter::new(file, dims, fps)?))
        }
        VideoFormat::Ffmpeg => Ok(Box::new(FfmpegWriter::create(path, dims, fps)?)),
        VideoFormat::PngFrames => Ok(Box::new(PngFrameWriter::create(path)?)),
    }
}

/// Opens the video at `path` for reading.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    match VideoFormat::from_path(path)? {
        VideoFormat::Y4m => {
            let file = BufReader::new(File::open(path)?);
            Ok(Box::new(Y4mReader::new(file)?))
        }
        VideoFormat::Ffmpeg => Ok(Box::new(FfmpegReader::open(path)?)),
        VideoFormat::PngFrames => Ok(Box::new(PngFrameReader::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    #[rstest]
    #[case::y4m("out.y4m", VideoFormat::Y4m)]
    #[case::upper("OUT.Y4M", VideoFormat::Y4m)]
    #[case::dir("frames", VideoFormat::PngFrames)]
    #[case::existing_dir("./src", VideoFormat::PngFrames)]
    #[case::mp4("clip.mp4", VideoFormat::Ffmpeg)]
    #[case::mkv("clip.MKV", VideoFormat::Ffmpeg)]
    #[case::mov("clip.mov", VideoFormat::Ffmpeg)]
    fn format_from_path(#[case] path: &str, #[case] expected: VideoFormat) {
        assert_eq!(VideoFormat::from_path(Path::new(path)).unwrap(), expected);
    }

    #[rstest]
    #[case::avi("clip.avi")]
    #[case::archive("backup.zip")]
    fn unknown_extension_is_rejected(#[case] path: &str) {
        assert!(matches!(
            VideoFormat::from_path(Path::new(path)),
            Err(VideoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unknown_extension_creates_nothing() {
        let path = Path::new("./target/test-videos/clip.webm");
        let _ = std::fs::remove_dir_all(path);

        assert!(create_sink(path, (32, 32), 30).is_err());
        assert!(!path.exists());
    }
}
