//! Video -> file.
//!
//! Frames are decoded in batches of `batch_size`. Each frame is handed to the
//! worker pool as soon as it is read, and the job owns exactly one slot of
//! the batch. Once the batch is full (or the video runs out), the pipeline
//! waits for every job in the batch, then writes the slots in order with a
//! single write. The next batch is not started until that write is done.
//!
//! ```text
//!            ┌──────── batch k ────────┐
//! source ──► │ slot 0 │ slot 1 │ ... │ slot n-1 │ ──(join)──► output
//!            └─────────────────────────┘
//! ```
//!
//! Workers finish in any order; the slot index alone fixes where their bytes
//! land. A worker that hangs stalls the whole conversion, since there is no
//! per-frame timeout.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use image::GrayImage;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::codec::FrameCodec;
use crate::config::Settings;
use crate::error::{CodecError, Error, Result, VideoError, WorkerError};
use crate::video::FrameSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub batches: u64,
    pub bytes_written: u64,
}

/// One frame's place in a batch.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Done(Result<Vec<u8>, WorkerError>),
}

pub struct DecodePipeline {
    codec: FrameCodec,
    batch_size: usize,
    pool: ThreadPool,
}

impl DecodePipeline {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Self::with_codec(FrameCodec::from_settings(settings)?, settings.batch_size)
    }

    /// Builds a pipeline with its own pool of `batch_size` worker threads.
    pub fn with_codec(codec: FrameCodec, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(crate::error::ConfigError::ZeroBatchSize.into());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(batch_size)
            .thread_name(|i| format!("bitvid-decode-{i}"))
            .build()?;

        Ok(Self {
            codec,
            batch_size,
            pool,
        })
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Decodes every frame of `source` and writes the bytes to `output`.
    pub fn run<S, W>(&self, source: &mut S, output: W) -> Result<DecodeStats>
    where
        S: FrameSource + ?Sized,
        W: Write,
    {
        let codec = self.codec;
        self.run_with(source, output, move |frame| codec.decode(frame))
    }

    /// Like [`run`](Self::run), with `worker` turning each frame into bytes.
    pub fn run_with<S, W, F>(&self, source: &mut S, mut output: W, worker: F) -> Result<DecodeStats>
    where
        S: FrameSource + ?Sized,
        W: Write,
        F: Fn(&GrayImage) -> Result<Vec<u8>, CodecError> + Sync,
    {
        let mut slots: Vec<Slot> = (0..self.batch_size).map(|_| Slot::Empty).collect();
        let mut stats = DecodeStats::default();

        log::info!(
            "decoding {:?} frames in batches of {}",
            self.codec.frame_dims(),
            self.batch_size
        );

        loop {
            let filled = self.fill(source, &mut slots, &worker)?;
            if filled == 0 {
                break;
            }

            let written = drain(&mut slots[..filled], stats.frames, &mut output)?;
            stats.frames += filled as u64;
            stats.batches += 1;
            stats.bytes_written += written as u64;
            log::debug!(
                "batch {} wrote frames ..{} ({written} bytes)",
                stats.batches,
                stats.frames
            );

            if filled < self.batch_size {
                break;
            }
        }

        output.flush()?;

        log::info!(
            "decoded {} frames into {} bytes",
            stats.frames,
            stats.bytes_written
        );
        Ok(stats)
    }

    /// Reads up to one batch of frames, dispatching each to the pool as it
    /// arrives. Returns once every dispatched job has finished.
    fn fill<S, F>(&self, source: &mut S, slots: &mut [Slot], worker: &F) -> Result<usize>
    where
        S: FrameSource + ?Sized,
        F: Fn(&GrayImage) -> Result<Vec<u8>, CodecError> + Sync,
    {
        let mut filled = 0;
        let mut read_error: Option<VideoError> = None;

        self.pool.in_place_scope(|scope| {
            for slot in slots.iter_mut() {
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                };

                filled += 1;
                scope.spawn(move |_| *slot = Slot::Done(decode_frame(worker, &frame)));
            }
        });

        match read_error {
            Some(e) => Err(e.into()),
            None => Ok(filled),
        }
    }
}

fn decode_frame<F>(worker: &F, frame: &GrayImage) -> Result<Vec<u8>, WorkerError>
where
    F: Fn(&GrayImage) -> Result<Vec<u8>, CodecError>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| worker(frame))) {
        Ok(result) => Ok(result?),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(WorkerError::Panicked(message))
        }
    }
}

/// Writes the filled slots in slot order, emptying them for the next batch.
///
/// `first_index` is the frame index of slot 0, used for error reports.
fn drain(slots: &mut [Slot], first_index: u64, output: &mut impl Write) -> Result<usize> {
    let mut bytes = vec![];

    for (i, slot) in slots.iter_mut().enumerate() {
        let index = first_index + i as u64;
        match std::mem::take(slot) {
            Slot::Done(Ok(chunk)) => bytes.extend_from_slice(&chunk),
            Slot::Done(Err(source)) => return Err(Error::Worker { index, source }),
            Slot::Empty => {
                return Err(Error::Worker {
                    index,
                    source: WorkerError::Panicked("worker never reported back".into()),
                })
            }
        }
    }

    output.write_all(&bytes)?;
    Ok(bytes.len())
}
