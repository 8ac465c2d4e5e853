//! File -> video.
//!
//! Encoding is strictly sequential: each chunk is drawn and appended to the
//! sink before the next one is read, since containers need frames in final
//! order anyway.

use std::io::Read;

use crate::chunk::ChunkSource;
use crate::codec::FrameCodec;
use crate::config::Settings;
use crate::error::Result;
use crate::video::FrameSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub frames: u64,
    pub bytes_read: u64,
    /// Zero bytes added to fill the final frame.
    pub padding_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct EncodePipeline {
    codec: FrameCodec,
}

impl EncodePipeline {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::with_codec(FrameCodec::from_settings(settings)?))
    }

    pub fn with_codec(codec: FrameCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Appends one frame per chunk of `reader` to `sink`, in order.
    ///
    /// On error the sink is left as it is; nothing is rolled back.
    pub fn run<R, S>(&self, reader: R, sink: &mut S) -> Result<EncodeStats>
    where
        R: Read,
        S: FrameSink + ?Sized,
    {
        let mut chunks = ChunkSource::new(reader, self.codec.bytes_per_image());
        let chunk_size = chunks.chunk_size();
        let mut stats = EncodeStats::default();

        log::info!(
            "encoding {chunk_size} bytes per frame into {:?} frames",
            self.codec.frame_dims()
        );

        while let Some(chunk) = chunks.next_chunk()? {
            let frame = self.codec.encode(&chunk.bytes)?;
            sink.append(&frame)?;

            log::trace!("frame {} <- {} bytes", chunk.index, chunk.bytes.len());
            stats.frames += 1;
            stats.bytes_read += chunk.bytes.len() as u64;
            stats.padding_bytes = (chunk_size - chunk.bytes.len()) as u64;
        }

        sink.finish()?;

        log::info!(
            "encoded {} bytes into {} frames ({} padding bytes)",
            stats.bytes_read,
            stats.frames,
            stats.padding_bytes
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::config::FrameResolution;
    use crate::error::{Error, VideoError};
    use crate::video::MemoryVideo;

    fn pipeline() -> EncodePipeline {
        // 8 bytes per frame, drawn at 2x
        EncodePipeline::with_codec(FrameCodec::new(
            FrameResolution::new(8, 8).unwrap(),
            2,
            128,
        ))
    }

    #[test]
    fn one_frame_per_chunk() {
        let data: Vec<u8> = (0..20).collect();
        let mut video = MemoryVideo::new();

        let stats = pipeline().run(data.as_slice(), &mut video).unwrap();

        assert_eq!(
            stats,
            EncodeStats {
                frames: 3,
                bytes_read: 20,
                padding_bytes: 4,
            }
        );
        assert_eq!(video.frame_count(), 3);
        assert!(video.is_finished());
        assert!(video.frames().all(|frame| frame.dimensions() == (16, 16)));
    }

    #[test]
    fn frames_follow_chunk_order() {
        let data: Vec<u8> = (0..32).collect();
        let mut video = MemoryVideo::new();
        let pipeline = pipeline();
        pipeline.run(data.as_slice(), &mut video).unwrap();

        for (frame, chunk) in video.frames().zip(data.chunks(8)) {
            assert_eq!(pipeline.codec().decode(frame).unwrap(), chunk);
        }
    }

    #[test]
    fn empty_input_writes_no_frames() {
        let mut video = MemoryVideo::new();
        let stats = pipeline().run(std::io::empty(), &mut video).unwrap();
        assert_eq!(stats, EncodeStats::default());
        assert_eq!(video.frame_count(), 0);
        assert!(video.is_finished());
    }

    struct FailingSink {
        accepted: usize,
    }

    impl FrameSink for FailingSink {
        fn append(&mut self, _frame: &image::GrayImage) -> Result<(), VideoError> {
            if self.accepted == 1 {
                return Err(VideoError::Io(std::io::ErrorKind::BrokenPipe.into()));
            }
            self.accepted += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), VideoError> {
            panic!("finish must not run after a failed append");
        }
    }

    /// Hands out `good` bytes, then fails.
    struct BrokenReader {
        good: usize,
    }

    impl std::io::Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.good == 0 {
                return Err(std::io::ErrorKind::ConnectionReset.into());
            }
            let n = buf.len().min(self.good);
            buf[..n].fill(0x5A);
            self.good -= n;
            Ok(n)
        }
    }

    #[test]
    fn read_error_aborts_without_finishing() {
        let mut video = MemoryVideo::new();
        let err = pipeline()
            .run(BrokenReader { good: 12 }, &mut video)
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        // Only the chunk completed before the failure made it out
        assert_eq!(video.frame_count(), 1);
        assert!(!video.is_finished());
    }

    #[test]
    fn sink_error_aborts() {
        let data = [0_u8; 24];
        let mut sink = FailingSink { accepted: 0 };
        let err = pipeline().run(&data[..], &mut sink).unwrap_err();
        assert!(matches!(err, Error::Video(VideoError::Io(_))));
        assert_eq!(sink.accepted, 1);
    }
}
