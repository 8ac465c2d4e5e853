//! A directory of numbered PNG frames.
//!
//! Handy for inspecting frames, and for feeding video tools that take an
//! image sequence (`ffmpeg -i frame_%06d.png ...`).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use image::GrayImage;
use regex::Regex;

use super::{FrameSink, FrameSource};
use crate::error::VideoError;

static FRAME_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_-]*([0-9]+)\.png$").expect("valid frame name pattern"));

pub struct PngFrameWriter {
    dir: PathBuf,
    next_index: u64,
}

impl PngFrameWriter {
    /// Creates `dir` if needed. Numbered frames already in it are deleted,
    /// so a reader never picks up frames left over from an earlier video.
    pub fn create(dir: &Path) -> Result<Self, VideoError> {
        std::fs::create_dir_all(dir)?;

        let stale = numbered_frames(dir)?;
        if !stale.is_empty() {
            log::info!(
                "removing {} old frames from {}",
                stale.len(),
                dir.display()
            );
        }
        for (_number, path) in stale {
            std::fs::remove_file(path)?;
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            next_index: 0,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameSink for PngFrameWriter {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError> {
        frame.save(self.frame_path(self.next_index))?;
        self.next_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        Ok(())
    }
}

pub struct PngFrameReader {
    paths: VecDeque<PathBuf>,
}

impl PngFrameReader {
    pub fn open(dir: &Path) -> Result<Self, VideoError> {
        if !dir.is_dir() {
            return Err(VideoError::NotADirectory(dir.to_path_buf()));
        }

        let frames = find_frames(dir)?;
        log::debug!("found {} frames in {}", frames.len(), dir.display());

        Ok(Self {
            paths: frames.into_iter().map(|(_number, path)| path).collect(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for PngFrameReader {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        Ok(Some(image::open(&path)?.to_luma8()))
    }
}

/// Every `*<digits>.png` file in `dir`, in no particular order.
fn numbered_frames(dir: &Path) -> Result<Vec<(u64, PathBuf)>, VideoError> {
    let mut files = vec![];

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(number) = FRAME_NAME
            .captures(name)
            .and_then(|captures| captures[1].parse::<u64>().ok())
        else {
            continue;
        };

        files.push((number, path));
    }

    Ok(files)
}

/// Lists numbered frames in `dir`, sorted by number.
fn find_frames(dir: &Path) -> Result<Vec<(u64, PathBuf)>, VideoError> {
    let mut files = numbered_frames(dir)?;
    files.sort_by_key(|(number, _path)| *number);

    for pair in files.windows(2) {
        let (prev, next) = (pair[0].0, pair[1].0);
        if prev == next {
            return Err(VideoError::DuplicateFrame {
                dir: dir.to_path_buf(),
                number: next,
            });
        }
        if next != prev + 1 {
            log::warn!(
                "frames {}..{} are missing from {}",
                prev + 1,
                next,
                dir.display()
            );
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::{Luma, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from("./target/test-frames").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn round_trip_frames() {
        let dir = test_dir("png_round_trip");
        let frames: Vec<GrayImage> = (0..3)
            .map(|i| GrayImage::from_fn(8, 4, |x, y| Luma([(x + y * 8) as u8 * 8 + i])))
            .collect();

        let mut writer = PngFrameWriter::create(&dir).unwrap();
        for frame in &frames {
            writer.append(frame).unwrap();
        }
        writer.finish().unwrap();
        assert!(writer.frame_path(2).is_file());

        let mut reader = PngFrameReader::open(&dir).unwrap();
        assert_eq!(reader.remaining(), 3);

        let mut decoded = vec![];
        while let Some(frame) = reader.next_frame().unwrap() {
            decoded.push(frame);
        }
        assert_eq!(decoded, frames);
    }

    #[test]
    fn sorts_numerically_and_skips_strays() {
        let dir = test_dir("png_sorting");
        std::fs::create_dir_all(&dir).unwrap();

        // Colour frames are converted to luma on the way in
        for (name, value) in [("shot_10.png", 30_u8), ("shot_9.png", 20), ("shot_1.png", 10)] {
            RgbImage::from_pixel(2, 2, Rgb([value; 3]))
                .save(dir.join(name))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut reader = PngFrameReader::open(&dir).unwrap();
        let mut values = vec![];
        while let Some(frame) = reader.next_frame().unwrap() {
            values.push(frame.get_pixel(0, 0).0[0]);
        }
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn duplicate_numbers_are_rejected() {
        let dir = test_dir("png_duplicates");
        std::fs::create_dir_all(&dir).unwrap();
        GrayImage::new(2, 2).save(dir.join("a_1.png")).unwrap();
        GrayImage::new(2, 2).save(dir.join("b_01.png")).unwrap();

        assert!(matches!(
            PngFrameReader::open(&dir),
            Err(VideoError::DuplicateFrame { number: 1, .. })
        ));
    }

    #[test]
    fn rewriting_a_directory_drops_old_frames() {
        let dir = test_dir("png_rewrite");

        let mut writer = PngFrameWriter::create(&dir).unwrap();
        for _ in 0..5 {
            writer.append(&GrayImage::from_pixel(2, 2, Luma([170]))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "kept").unwrap();

        let mut writer = PngFrameWriter::create(&dir).unwrap();
        for _ in 0..2 {
            writer.append(&GrayImage::from_pixel(2, 2, Luma([17]))).unwrap();
        }

        let mut reader = PngFrameReader::open(&dir).unwrap();
        assert_eq!(reader.remaining(), 2);
        while let Some(frame) = reader.next_frame().unwrap() {
            assert_eq!(frame.get_pixel(0, 0).0[0], 17);
        }
        assert!(dir.join("notes.txt").is_file());
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = test_dir("png_missing");
        assert!(matches!(
            PngFrameReader::open(&dir),
            Err(VideoError::NotADirectory(_))
        ));
    }
}
