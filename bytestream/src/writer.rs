//! Byte writer for encoding little-endian binary data.

use crate::error::{ByteError, ByteResult};

/// An appending writer for little-endian binary data.
///
/// Writes are accumulated in an internal buffer. Call [`finish`](Self::finish)
/// to get the final byte buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    /// Creates a new empty `ByteWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ByteWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
        }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Drops everything written after `len` bytes.
    ///
    /// Used to roll back a partially written record.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.bytes.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes `N` consecutive `f32` values with no length prefix.
    pub fn write_f32_array<const N: usize>(&mut self, values: [f32; N]) {
        for value in values {
            self.write_f32(value);
        }
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Writes a `u16` length prefix followed by the UTF-8 bytes of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`ByteError::LengthOverflow`] if the string is longer than `u16::MAX` bytes.
    pub fn write_string(&mut self, value: &str) -> ByteResult<()> {
        let len = u16::try_from(value.len()).map_err(|_| ByteError::LengthOverflow {
            length: value.len(),
        })?;
        self.write_u16(len);
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Overwrites one byte already written.
    pub fn patch_u8(&mut self, position: usize, value: u8) -> ByteResult<()> {
        let Some(slot) = self.bytes.get_mut(position) else {
            return Err(ByteError::InvalidPatch {
                position,
                written: self.bytes.len(),
            });
        };
        *slot = value;
        Ok(())
    }

    /// Reserves two bytes for a `u16` that is filled in later with [`patch_u16`](Self::patch_u16).
    ///
    /// Returns the offset of the reserved bytes.
    pub fn reserve_u16(&mut self) -> usize {
        let position = self.bytes.len();
        self.bytes.extend_from_slice(&[0, 0]);
        position
    }

    /// Overwrites a previously reserved `u16`.
    pub fn patch_u16(&mut self, position: usize, value: u16) -> ByteResult<()> {
        let end = position.saturating_add(2);
        let Some(slot) = self.bytes.get_mut(position..end) else {
            return Err(ByteError::InvalidPatch {
                position,
                written: self.bytes.len(),
            });
        };
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Reserves four bytes for a `u32` filled in later with [`patch_u32`](Self::patch_u32).
    pub fn reserve_u32(&mut self) -> usize {
        let position = self.bytes.len();
        self.bytes.extend_from_slice(&[0; 4]);
        position
    }

    /// Overwrites a previously reserved `u32`.
    pub fn patch_u32(&mut self, position: usize, value: u32) -> ByteResult<()> {
        let end = position.saturating_add(4);
        let Some(slot) = self.bytes.get_mut(position..end) else {
            return Err(ByteError::InvalidPatch {
                position,
                written: self.bytes.len(),
            });
        };
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Finishes writing and returns the byte buffer.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    pub fn finish_into(mut self, buf: &mut Vec<u8>) {
        buf.append(&mut self.bytes);
    }
}
