//! Byte reader with bounded operations.

use crate::error::{ByteError, ByteResult};

/// A cursor over little-endian binary data.
///
/// All read operations are bounds-checked and return
/// [`ByteError::TruncatedInput`] instead of panicking on short input.
/// A failed read leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new `ByteReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of bytes remaining to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns `true` if there are no more bytes to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unread tail of the buffer without consuming it.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn read_u8(&mut self) -> ByteResult<u8> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }

    pub fn read_i8(&mut self) -> ByteResult<i8> {
        Ok(i8::from_le_bytes(self.read_array::<1>()?))
    }

    pub fn read_u16(&mut self) -> ByteResult<u16> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_i16(&mut self) -> ByteResult<i16> {
        Ok(i16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> ByteResult<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_i32(&mut self) -> ByteResult<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> ByteResult<u64> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_i64(&mut self) -> ByteResult<i64> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_f32(&mut self) -> ByteResult<f32> {
        Ok(f32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_f64(&mut self) -> ByteResult<f64> {
        Ok(f64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Reads `N` consecutive `f32` values.
    pub fn read_f32_array<const N: usize>(&mut self) -> ByteResult<[f32; N]> {
        self.ensure(N * 4)?;
        let mut out = [0.0f32; N];
        for slot in &mut out {
            *slot = self.read_f32()?;
        }
        Ok(out)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> ByteResult<&'a [u8]> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> ByteResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads a `u16` length prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> ByteResult<String> {
        let start = self.pos;
        let len = usize::from(self.read_u16()?);
        let bytes = match self.read_bytes(len) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.pos = start;
                return Err(err);
            }
        };
        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(value.to_owned()),
            Err(_) => {
                self.pos = start;
                Err(ByteError::InvalidUtf8 { position: start + 2 })
            }
        }
    }

    fn ensure(&self, len: usize) -> ByteResult<()> {
        let available = self.remaining();
        if len > available {
            return Err(ByteError::TruncatedInput {
                requested: len,
                available,
            });
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> ByteResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}
