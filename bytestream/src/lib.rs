//! Bounded little-endian byte cursor for the tickwire protocol.
//!
//! This crate provides [`ByteWriter`] and [`ByteReader`] for fixed-width
//! binary encoding and decoding. Every integer is little-endian, strings
//! carry a `u16` length prefix, and float vectors are written as consecutive
//! `f32` values with no prefix.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about entities, schemas, or commands.
//! - **Explicit errors** - Short input returns [`ByteError::TruncatedInput`], never panics.
//!
//! # Example
//!
//! ```
//! use bytestream::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new();
//! writer.write_u32(42);
//! writer.write_string("lobby").unwrap();
//!
//! let bytes = writer.finish();
//!
//! let mut reader = ByteReader::new(&bytes);
//! assert_eq!(reader.read_u32().unwrap(), 42);
//! assert_eq!(reader.read_string().unwrap(), "lobby");
//! ```

mod error;
mod reader;
mod writer;

pub use error::{ByteError, ByteResult};
pub use reader::ByteReader;
pub use writer::ByteWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        let writer = ByteWriter::new();
        let bytes = writer.finish();
        assert!(bytes.is_empty());

        let reader = ByteReader::new(&bytes);
        assert!(reader.is_empty());
    }

    #[test]
    fn mixed_roundtrip() {
        let mut writer = ByteWriter::new();
        writer.write_bool(true);
        writer.write_i16(-300);
        writer.write_u64(u64::MAX);
        writer.write_f32_array([0.0, 1.0, 0.0]);
        writer.write_string("").unwrap();
        writer.write_f64(-0.5);
        let bytes = writer.finish();

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_i16().unwrap(), -300);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_f32_array::<3>().unwrap(), [0.0, 1.0, 0.0]);
        assert_eq!(reader.read_string().unwrap(), "");
        assert!((reader.read_f64().unwrap() + 0.5).abs() < f64::EPSILON);
        assert!(reader.is_empty());
    }

    #[test]
    fn doctest_example() {
        let mut writer = ByteWriter::new();
        writer.write_u32(42);
        writer.write_string("lobby").unwrap();

        let bytes = writer.finish();

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_string().unwrap(), "lobby");
    }
}
