//! Splits an input stream into frame-sized chunks.

use std::io::{self, Read};

/// One frame's worth of file bytes.
///
/// Only the final chunk of a stream may be shorter than the chunk size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteChunk {
    pub index: u64,
    pub bytes: Vec<u8>,
}

/// Lazily reads fixed-size [`ByteChunk`]s from a reader, in order.
///
/// The sequence ends at the first read that returns no bytes. After a read
/// error is yielded the iterator is finished.
pub struct ChunkSource<R> {
    reader: R,
    chunk_size: usize,
    next_index: u64,
    finished: bool,
}

impl<R: Read> ChunkSource<R> {
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            reader,
            chunk_size,
            next_index: 0,
            finished: false,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn next_chunk(&mut self) -> io::Result<Option<ByteChunk>> {
        if self.finished {
            return Ok(None);
        }

        let bytes = match read_up_to(&mut self.reader, self.chunk_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        if bytes.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        if bytes.len() < self.chunk_size {
            // A short read only happens at EOF
            self.finished = true;
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(ByteChunk { index, bytes }))
    }
}

impl<R: Read> Iterator for ChunkSource<R> {
    type Item = io::Result<ByteChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Reads until `len` bytes are buffered or the reader hits EOF.
fn read_up_to(reader: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    let mut filled = 0;

    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}
