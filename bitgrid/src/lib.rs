#![cfg_attr(not(feature = "std"), no_std)]

//! A packed, 1-bit-per-pixel grid.
//!
//! Pixels are stored row-major as one continuous bit stream, most significant
//! bit first within each byte. Pixel `(x, y)` is bit `y * width + x`.

extern crate alloc;

use alloc::{vec, vec::Vec};
use core::fmt::Debug;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitGrid {
    width: usize,
    height: usize,
    bytes: Vec<u8>,
}

impl Debug for BitGrid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("set", &self.count_set())
            .finish()
    }
}

impl BitGrid {
    /// Creates a grid with every pixel unset.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bytes: vec![0; Self::byte_len(width, height)],
        }
    }

    /// Builds a grid from packed bytes.
    ///
    /// `bytes` shorter than the grid are right-padded with zeroes. Returns
    /// `None` if `bytes` holds more than the grid can store.
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> Option<Self> {
        let mut grid = Self::new(width, height);
        grid.bytes.get_mut(..bytes.len())?.copy_from_slice(bytes);
        Some(grid)
    }

    /// Number of bytes needed to pack a `width` x `height` grid.
    pub const fn byte_len(width: usize, height: usize) -> usize {
        (width * height).div_ceil(8)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn count_set(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn get(&self, x: usize, y: usize) -> bool {
        let (byte, mask) = self.locate(x, y);
        self.bytes[byte] & mask != 0
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        let (byte, mask) = self.locate(x, y);
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    fn locate(&self, x: usize, y: usize) -> (usize, u8) {
        if x >= self.width || y >= self.height {
            panic!(
                "Out of bounds access on BitGrid: ({x}, {y}) but grid is ({w}, {h})",
                w = self.width,
                h = self.height
            );
        }
        let bit = y * self.width + x;
        (bit / 8, 0x80 >> (bit % 8))
    }
}
