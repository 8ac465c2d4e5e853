//! # bitvid
//!
//! Stores arbitrary files as black and white video, and reads them back.
//!
//! Every frame carries a fixed number of file bytes, one bit per pixel
//! (optionally drawn as larger blocks so the bits survive lossy re-encoding).
//!
//! ```text
//! file ─► ChunkSource ─► FrameCodec::encode ─► FrameSink    (EncodePipeline)
//! FrameSource ─► FrameCodec::decode (batched, parallel) ─► file (DecodePipeline)
//! ```
//!
//! Decoding always yields whole frames: a file whose size is not a multiple
//! of the frame size comes back with trailing zero bytes.

pub mod chunk;
pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod video;

pub use bitgrid::BitGrid;
pub use chunk::{ByteChunk, ChunkSource};
pub use codec::FrameCodec;
pub use config::{FrameResolution, Settings};
pub use decode::{DecodePipeline, DecodeStats};
pub use encode::{EncodePipeline, EncodeStats};
pub use error::{CodecError, ConfigError, Error, Result, VideoError, WorkerError};
pub use video::{FrameSink, FrameSource, MemoryVideo};
