use std::collections::VecDeque;

use image::GrayImage;

use super::{FrameSink, FrameSource};
use crate::error::VideoError;

/// Frames held in memory; a sink while encoding, a source while decoding.
#[derive(Debug, Clone, Default)]
pub struct MemoryVideo {
    frames: VecDeque<GrayImage>,
    finished: bool,
}

impl MemoryVideo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn frames(&self) -> impl Iterator<Item = &GrayImage> {
        self.frames.iter()
    }
}

impl From<Vec<GrayImage>> for MemoryVideo {
    fn from(frames: Vec<GrayImage>) -> Self {
        Self {
            frames: frames.into(),
            finished: true,
        }
    }
}

impl FrameSink for MemoryVideo {
    fn append(&mut self, frame: &GrayImage) -> Result<(), VideoError> {
        self.frames.push_back(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.finished = true;
        Ok(())
    }
}

impl FrameSource for MemoryVideo {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, VideoError> {
        Ok(self.frames.pop_front())
    }
}
