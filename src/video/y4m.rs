//! YUV4MPEG2 (`.y4m`) streams.
//!
//! Layout:
//!
//! ```text
//! YUV4MPEG2 W{width} H{height} F{num}:{den} Ip A1:1 C{colorspace}\n
//! FRAME\n  [ luma: width * height bytes ] [ chroma planes, if any ]
//! FRAME\n  ...
//! ```
//!
//! We always write `Cmono`. Anything 8-bit that tools like ffmpeg hand back
//! (usually `C420jpeg`) is accepted and reduced to its luma plane.

use std::io::{self, BufRead, Read, Write};

use image::GrayImage;

use super::{FrameSink, FrameSource};
use crate::error::VideoError;

const MAGIC: &str = "YUV4MPEG2";
const FRAME_MAGIC: &[u8] = b"FRAME";

// Headers are a handful of short tokens; anything longer is not a y4m stream.
const MAX_LINE: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    /// Frame rate as `numerator:denominator`.
    pub fps: (u32, u32),
    pub colorspace: String,
}

impl Y4mHeader {
    pub fn parse(line: &str) -> Result<Self, VideoError> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some(MAGIC) {
            return Err(VideoError::InvalidHeader(format!("missing {MAGIC} magic")));
        }

        let mut width = None;
        let mut height = None;
        let mut fps = (0, 0);
        let mut colorspace = "420jpeg".to_string();

        for token in tokens {
            let mut chars = token.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('W') => width = Some(parse_number(value, "width")?),
                Some('H') => height = Some(parse_number(value, "height")?),
                Some('F') => {
                    let (num, den) = value
                        .split_once(':')
                        .ok_or_else(|| VideoError::InvalidHeader(format!("bad frame rate {value:?}")))?;
                    fps = (parse_number(num, "fps")?, parse_number(den, "fps")?);
                }
                Some('C') => colorspace = value.to_string(),
                // Interlacing, aspect ratio and extensions don't matter for greyscale data
                _ => {}
            }
        }

        match (width, height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(Self {
                width,
                height,
                fps,
                colorspace,
            }),
            _ => Err(VideoError::InvalidHeader("missing frame dimensions".into())),
        }
    }

    /// Bytes following the luma plane in every frame.
    pub fn chroma_len(&self) -> Result<usize, VideoError> {
        let (w, h) = (self.width as usize, self.height as usize);
        let (half_w, half_h) = (w.div_ceil(2), h.div_ceil(2));

        match self.colorspace.as_str() {
            "mono" => Ok(0),
            "420jpeg" | "420paldv" | "420mpeg2" | "420" => Ok(2 * half_w * half_h),
            "422" => Ok(2 * half_w * h),
            "444" => Ok(2 * w * h),
            "444alpha" => Ok(3 * w * h),
            other => Err(VideoError::UnsupportedColorspace(other.to_string())),
        }
    }
}

fn parse_number(value: &str, what: &str) -> Result<u32, VideoError> {
    value
        .parse()
        .map_err(|_| VideoError::InvalidHeader(format!("bad {what} {value:?}")))
}

/// Reads one `\n`-terminated line, without the terminator.
///
/// Returns `None` at a clean EOF.
fn read_line(reader: &mut impl BufRead) -> io::Result<Option<Vec<u8>>> {
    let mut line = vec![];
    reader.take(MAX_LINE).read_until(b'\n', &mut line)?;

    if line.is_empty() {
        return Ok(None);
    }
    if line.pop() != Some(b'\n') {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(Some(line))
}

pub struct Y4mWriter<W: Write> {
    inner: W,
    dims: (u32, u32),
    frames_written: u64,
}

impl<W: Write> Y4mWriter<W> {
    /// Writes the stream header immediately, even if no frames follow.
    pub fn new(mut inner: W, dims: (u32, u32), fps: u32) -> Result<Self, VideoError> {
        let (width, height) = dims;
        writeln!(inner, "{MAGIC} W{width} H{height} F{fps}:1 Ip A1:1 Cmono")?;

        Ok(Self {
            inner,
            dims,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> FrameSink for Y4mWriter<W> {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError> {
        if frame.dimensions() != self.dims {
            return Err(VideoError::ResolutionMismatch {
                index: self.frames_written,
                expected: self.dims,
                actual: frame.dimensions(),
            });
        }

        self.inner.write_all(FRAME_MAGIC)?;
        self.inner.write_all(b"\n")?;
        self.inner.write_all(frame.as_raw())?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.inner.flush()?;
        Ok(())
    }
}

pub struct Y4mReader<R: BufRead> {
    inner: R,
    header: Y4mHeader,
    chroma_len: usize,
    frames_read: u64,
}

impl<R: BufRead> Y4mReader<R> {
    pub fn new(mut inner: R) -> Result<Self, VideoError> {
        let line = read_line(&mut inner)
            .map_err(|_| VideoError::InvalidHeader("unterminated header".into()))?
            .ok_or_else(|| VideoError::InvalidHeader("empty stream".into()))?;
        let line = String::from_utf8(line)
            .map_err(|_| VideoError::InvalidHeader("header is not ASCII".into()))?;

        let header = Y4mHeader::parse(&line)?;
        let chroma_len = header.chroma_len()?;
        log::debug!("opened y4m stream {header:?}");

        Ok(Self {
            inner,
            header,
            chroma_len,
            frames_read: 0,
        })
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }
}

impl<R: BufRead> FrameSource for Y4mReader<R> {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError> {
        let index = self.frames_read;
        let truncated = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => VideoError::TruncatedFrame { index },
            _ => VideoError::Io(e),
        };

        let Some(line) = read_line(&mut self.inner).map_err(truncated)? else {
            return Ok(None);
        };
        if !line.starts_with(FRAME_MAGIC) {
            return Err(VideoError::InvalidHeader(format!(
                "frame {index} does not start with FRAME"
            )));
        }

        let (width, height) = (self.header.width, self.header.height);
        let mut luma = vec![0; width as usize * height as usize];
        self.inner.read_exact(&mut luma).map_err(truncated)?;

        let skipped = io::copy(
            &mut (&mut self.inner).take(self.chroma_len as u64),
            &mut io::sink(),
        )?;
        if skipped != self.chroma_len as u64 {
            return Err(VideoError::TruncatedFrame { index });
        }

        self.frames_read += 1;
        let frame = GrayImage::from_raw(width, height, luma)
            .ok_or(VideoError::TruncatedFrame { index })?;
        Ok(Some(frame))
    }
}
