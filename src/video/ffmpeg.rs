//! Compressed video (`.mp4`, `.mkv`, `.mov`) through an `ffmpeg` child process.
//!
//! Frames cross the pipe as raw 8-bit `gray` pixels. `.mkv` is written with
//! the lossless FFV1 codec; everything else with H.264 (`yuv420p`), which
//! is what video sites expect but loses detail, so keep a resize factor.
//!
//! `ffmpeg` and `ffprobe` must be on the `PATH`.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::GrayImage;

use super::{FrameSink, FrameSource};
use crate::error::VideoError;

/// Extensions handed to ffmpeg.
pub const EXTENSIONS: &[&str] = &["mp4", "mkv", "mov"];

pub struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    dims: (u32, u32),
    frames_written: u64,
}

impl FfmpegWriter {
    pub fn create(path: &Path, dims: (u32, u32), fps: u32) -> Result<Self, VideoError> {
        let mut child = Command::new("ffmpeg")
            .args(encoder_args(path, dims, fps))
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| VideoError::Spawn {
                program: "ffmpeg",
                source,
            })?;
        log::debug!("spawned ffmpeg writer for {}", path.display());

        let stdin = child.stdin.take().map(BufWriter::new);
        Ok(Self {
            child: Some(child),
            stdin,
            dims,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Waits for ffmpeg after a failed write, preferring its own complaint.
    fn broken(&mut self, e: std::io::Error) -> VideoError {
        self.stdin = None;
        match self.child.take().map(|mut child| reap("ffmpeg", &mut child)) {
            Some(Err(failed)) => failed,
            _ => e.into(),
        }
    }
}

impl FrameSink for FfmpegWriter {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError> {
        if frame.dimensions() != self.dims {
            return Err(VideoError::ResolutionMismatch {
                index: self.frames_written,
                expected: self.dims,
                actual: frame.dimensions(),
            });
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        };
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            return Err(self.broken(e));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                return Err(self.broken(e));
            }
        }
        match self.child.take() {
            Some(mut child) => reap("ffmpeg", &mut child),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            self.stdin = None;
            let _ = child.wait();
        }
    }
}

#[derive(Debug)]
pub struct FfmpegReader {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    dims: (u32, u32),
    frames_read: u64,
}

impl FfmpegReader {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let dims = probe(path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "gray", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| VideoError::Spawn {
                program: "ffmpeg",
                source,
            })?;
        let Some(stdout) = child.stdout.take() else {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        };
        log::debug!("reading {}x{} frames from {}", dims.0, dims.1, path.display());

        Ok(Self {
            child: Some(child),
            stdout: BufReader::new(stdout),
            dims,
            frames_read: 0,
        })
    }

    pub fn dims(&self) -> (u32, u32) {
        self.dims
    }
}

impl FrameSource for FfmpegReader {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        let (width, height) = self.dims;
        let len = width as usize * height as usize;
        let mut luma = Vec::with_capacity(len);
        (&mut self.stdout).take(len as u64).read_to_end(&mut luma)?;

        if luma.is_empty() {
            let result = reap("ffmpeg", child);
            self.child = None;
            result?;
            return Ok(None);
        }

        let index = self.frames_read;
        self.frames_read += 1;
        GrayImage::from_raw(width, height, luma)
            .map(Some)
            .ok_or(VideoError::TruncatedFrame { index })
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Arguments for encoding raw `gray` frames from stdin. The output path goes last.
fn encoder_args(path: &Path, (width, height): (u32, u32), fps: u32) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "gray", "-s",
    ]
    .map(String::from)
    .into();
    args.push(format!("{width}x{height}"));
    args.extend(["-r".to_string(), fps.to_string()]);
    args.extend(["-i", "pipe:0"].map(String::from));

    let lossless = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mkv"));
    let codec = if lossless {
        ["-c:v", "ffv1", "-pix_fmt", "gray"]
    } else {
        ["-c:v", "libx264", "-pix_fmt", "yuv420p"]
    };
    args.extend(codec.map(String::from));
    args
}

/// Size of the first video stream, via `ffprobe`.
fn probe(path: &Path) -> Result<(u32, u32), VideoError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .map_err(|source| VideoError::Spawn {
            program: "ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(VideoError::Process {
            program: "ffprobe",
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    parse_dims(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `1280,720` (ffprobe's csv output).
fn parse_dims(text: &str) -> Result<(u32, u32), VideoError> {
    let invalid = || VideoError::Probe(text.to_string());

    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(invalid)?;
    let mut fields = line.split(',').filter(|field| !field.is_empty());

    let width = fields.next().and_then(|w| w.parse().ok()).ok_or_else(invalid)?;
    let height = fields.next().and_then(|h| h.parse().ok()).ok_or_else(invalid)?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

/// Waits for `child`, turning a failed exit into an error carrying its stderr.
fn reap(program: &'static str, child: &mut Child) -> Result<(), VideoError> {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr)?;
    }

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(VideoError::Process {
            program,
            status,
            stderr: stderr.trim().to_string(),
        })
    }
}
