//! Error types for every layer of a conversion.
//!
//! Nothing here is recoverable: any error aborts the whole conversion and
//! partial output is left for the caller to clean up.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unreadable [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("frame resolution {width}x{height} must be non-zero")]
    EmptyResolution { width: u32, height: u32 },

    /// Every pixel holds one bit, so a frame must hold a whole number of bytes.
    #[error("frame resolution {width}x{height} does not hold a whole number of bytes")]
    UnalignedResolution { width: u32, height: u32 },

    #[error("fps must be at least 1")]
    ZeroFps,

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config: {0}")]
    Write(#[from] std::io::Error),
}

/// A frame or chunk that does not fit the configured resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame is {}x{}, expected {}x{}", actual.0, actual.1, expected.0, expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("chunk of {len} bytes does not fit in a frame of {max} bytes")]
    ChunkTooLarge { len: usize, max: usize },
}

/// Failures of the video reader/writer adapters.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid y4m header: {0}")]
    InvalidHeader(String),

    #[error("unsupported y4m colorspace: {0}")]
    UnsupportedColorspace(String),

    #[error("frame {index} is truncated")]
    TruncatedFrame { index: u64 },

    #[error("frame {index} is {}x{}, video is {}x{}", actual.0, actual.1, expected.0, expected.1)]
    ResolutionMismatch {
        index: u64,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("frame number {number} appears more than once in {dir}")]
    DuplicateFrame { dir: PathBuf, number: u64 },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("don't know how to store video as {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to run {program} (is ffmpeg installed?): {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("could not read the video size from ffprobe output {0:?}")]
    Probe(String),
}

/// A decode worker that did not produce bytes for its frame.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// The error returned by a whole encode or decode conversion.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("decoding frame {index} failed: {source}")]
    Worker {
        index: u64,
        #[source]
        source: WorkerError,
    },

    #[error("failed to start decode workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = CodecError::DimensionMismatch {
            expected: (320, 180),
            actual: (640, 360),
        };
        assert_eq!(e.to_string(), "frame is 640x360, expected 320x180");

        let e = Error::Worker {
            index: 7,
            source: WorkerError::Panicked("boom".into()),
        };
        assert!(e.to_string().contains("frame 7"));
        assert!(e.to_string().contains("boom"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn codec_error_lifts_into_worker_error() {
        let e: WorkerError = CodecError::ChunkTooLarge { len: 9, max: 8 }.into();
        assert!(matches!(e, WorkerError::Codec(_)));
    }
}
