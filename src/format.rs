// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoding/decoding primitives for the WebAssembly binary format.

mod leb128;

pub use leb128::{
    read_sleb128_i32, read_sleb128_i64, read_uleb128_u32, read_uleb128_u64, write_sleb128_i32,
    write_sleb128_i64, write_uleb128_u32, write_uleb128_u64,
};

use alloc::vec::Vec;
use core::fmt;

/// A decode error for WebAssembly binary input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended unexpectedly.
    UnexpectedEof,
    /// An integer encoding was invalid or overflowed its target width.
    InvalidVarint,
    /// A length/offset was out of bounds.
    OutOfBounds,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidVarint => write!(f, "invalid varint encoding"),
            Self::OutOfBounds => write!(f, "out of bounds"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// A simple byte reader with bounds checks.
///
/// The cursor advances by exactly the number of bytes each read consumes,
/// so interleaved fixed-width and variable-width reads stay in sync.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` when the cursor has consumed all input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a little-endian IEEE 754 `f32` bit pattern.
    pub fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    /// Reads a little-endian IEEE 754 `f64` bit pattern.
    pub fn read_f64_le(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    /// Reads an unsigned LEB128 integer as `u32`.
    pub fn read_uleb128_u32(&mut self) -> Result<u32, DecodeError> {
        read_uleb128_u32(self.bytes, &mut self.offset)
    }

    /// Reads an unsigned LEB128 integer as `u64`.
    pub fn read_uleb128_u64(&mut self) -> Result<u64, DecodeError> {
        read_uleb128_u64(self.bytes, &mut self.offset)
    }

    /// Reads a signed LEB128 integer as `i32`.
    pub fn read_sleb128_i32(&mut self) -> Result<i32, DecodeError> {
        read_sleb128_i32(self.bytes, &mut self.offset)
    }

    /// Reads a signed LEB128 integer as `i64`.
    pub fn read_sleb128_i64(&mut self) -> Result<i64, DecodeError> {
        read_sleb128_i64(self.bytes, &mut self.offset)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }
}

/// A simple byte writer, the encode-side mirror of [`Reader`].
#[derive(Clone, Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Returns a reference to the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns the underlying byte buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a `u8`.
    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32_le(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64_le(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a little-endian IEEE 754 `f32` bit pattern.
    pub fn write_f32_le(&mut self, v: f32) {
        self.write_u32_le(v.to_bits());
    }

    /// Appends a little-endian IEEE 754 `f64` bit pattern.
    pub fn write_f64_le(&mut self, v: f64) {
        self.write_u64_le(v.to_bits());
    }

    /// Appends an unsigned LEB128 integer (`u32`).
    pub fn write_uleb128_u32(&mut self, v: u32) {
        write_uleb128_u32(&mut self.bytes, v);
    }

    /// Appends an unsigned LEB128 integer (`u64`).
    pub fn write_uleb128_u64(&mut self, v: u64) {
        write_uleb128_u64(&mut self.bytes, v);
    }

    /// Appends a signed LEB128 integer (`i32`).
    pub fn write_sleb128_i32(&mut self, v: i32) {
        write_sleb128_i32(&mut self.bytes, v);
    }

    /// Appends a signed LEB128 integer (`i64`).
    pub fn write_sleb128_i64(&mut self, v: i64) {
        write_sleb128_i64(&mut self.bytes, v);
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }
}
