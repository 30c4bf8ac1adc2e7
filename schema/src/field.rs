//! Field kinds, values, and the field codec.

use bytestream::{ByteReader, ByteWriter};

use crate::error::{FieldError, FieldResult};

/// The wire representation of a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    /// Boolean (one byte, 0 or 1).
    Bool,

    /// Signed integer of 8, 16, 32 or 64 bits.
    Int { bits: u8 },

    /// Unsigned integer of 8, 16, 32 or 64 bits.
    UInt { bits: u8 },

    /// IEEE float of 32 or 64 bits.
    Float { bits: u8 },

    /// UTF-8 string with a `u16` length prefix.
    String,

    /// Two `f32` components.
    Vec2,

    /// Three `f32` components.
    Vec3,

    /// Four `f32` components.
    Vec4,

    /// 16-bit wrapping network timestamp, sign-extended on decode.
    Timestamp16,
}

impl FieldKind {
    #[must_use]
    pub const fn int(bits: u8) -> Self {
        Self::Int { bits }
    }

    #[must_use]
    pub const fn uint(bits: u8) -> Self {
        Self::UInt { bits }
    }

    #[must_use]
    pub const fn float(bits: u8) -> Self {
        Self::Float { bits }
    }

    /// Returns `true` if the declared width is one this codec can encode.
    #[must_use]
    pub const fn has_valid_width(self) -> bool {
        match self {
            Self::Int { bits } | Self::UInt { bits } => {
                matches!(bits, 8 | 16 | 32 | 64)
            }
            Self::Float { bits } => matches!(bits, 32 | 64),
            _ => true,
        }
    }

    /// Encoded size in bytes, or `None` for length-prefixed kinds.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Int { bits } | Self::UInt { bits } | Self::Float { bits } => {
                Some(bits as usize / 8)
            }
            Self::String => None,
            Self::Vec2 => Some(8),
            Self::Vec3 => Some(12),
            Self::Vec4 => Some(16),
            Self::Timestamp16 => Some(2),
        }
    }

    /// The value a freshly created object holds for this kind.
    #[must_use]
    pub fn default_value(self) -> FieldValue {
        match self {
            Self::Bool => FieldValue::Bool(false),
            Self::Int { .. } => FieldValue::Int(0),
            Self::UInt { .. } => FieldValue::UInt(0),
            Self::Float { .. } => FieldValue::Float(0.0),
            Self::String => FieldValue::String(String::new()),
            Self::Vec2 => FieldValue::Vec2([0.0; 2]),
            Self::Vec3 => FieldValue::Vec3([0.0; 3]),
            Self::Vec4 => FieldValue::Vec4([0.0; 4]),
            Self::Timestamp16 => FieldValue::Timestamp(0),
        }
    }
}

/// A replicated field value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Timestamp(i32),
}

impl FieldValue {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Returns `true` if this value variant can be stored in a field of `kind`.
    #[must_use]
    pub const fn matches(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Bool(_), FieldKind::Bool)
                | (Self::Int(_), FieldKind::Int { .. })
                | (Self::UInt(_), FieldKind::UInt { .. })
                | (Self::Float(_), FieldKind::Float { .. })
                | (Self::String(_), FieldKind::String)
                | (Self::Vec2(_), FieldKind::Vec2)
                | (Self::Vec3(_), FieldKind::Vec3)
                | (Self::Vec4(_), FieldKind::Vec4)
                | (Self::Timestamp(_), FieldKind::Timestamp16)
        )
    }
}

/// Appends the encoding of `value` as `kind`.
///
/// Nothing is written when an error is returned.
pub fn encode_value(kind: FieldKind, value: &FieldValue, out: &mut ByteWriter) -> FieldResult<()> {
    if !value.matches(kind) {
        return Err(FieldError::TypeMismatch {
            kind,
            found: value.type_name(),
        });
    }
    let out_of_range = || FieldError::OutOfRange { kind };

    match (kind, value) {
        (FieldKind::Bool, FieldValue::Bool(v)) => out.write_bool(*v),
        (FieldKind::Int { bits }, FieldValue::Int(v)) => match bits {
            8 => out.write_i8(i8::try_from(*v).map_err(|_| out_of_range())?),
            16 => out.write_i16(i16::try_from(*v).map_err(|_| out_of_range())?),
            32 => out.write_i32(i32::try_from(*v).map_err(|_| out_of_range())?),
            64 => out.write_i64(*v),
            _ => return Err(out_of_range()),
        },
        (FieldKind::UInt { bits }, FieldValue::UInt(v)) => match bits {
            8 => out.write_u8(u8::try_from(*v).map_err(|_| out_of_range())?),
            16 => out.write_u16(u16::try_from(*v).map_err(|_| out_of_range())?),
            32 => out.write_u32(u32::try_from(*v).map_err(|_| out_of_range())?),
            64 => out.write_u64(*v),
            _ => return Err(out_of_range()),
        },
        (FieldKind::Float { bits }, FieldValue::Float(v)) => match bits {
            32 => {
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    return Err(out_of_range());
                }
                out.write_f32(*v as f32);
            }
            64 => out.write_f64(*v),
            _ => return Err(out_of_range()),
        },
        (FieldKind::String, FieldValue::String(v)) => out.write_string(v)?,
        (FieldKind::Vec2, FieldValue::Vec2(v)) => out.write_f32_array(*v),
        (FieldKind::Vec3, FieldValue::Vec3(v)) => out.write_f32_array(*v),
        (FieldKind::Vec4, FieldValue::Vec4(v)) => out.write_f32_array(*v),
        // Wraps modulo 2^16 by definition.
        (FieldKind::Timestamp16, FieldValue::Timestamp(v)) => out.write_u16(*v as u16),
        _ => {
            return Err(FieldError::TypeMismatch {
                kind,
                found: value.type_name(),
            })
        }
    }
    Ok(())
}

/// Consumes exactly the bytes [`encode_value`] writes for `kind`.
pub fn decode_value(kind: FieldKind, reader: &mut ByteReader<'_>) -> FieldResult<FieldValue> {
    let value = match kind {
        FieldKind::Bool => match reader.read_u8()? {
            0 => FieldValue::Bool(false),
            1 => FieldValue::Bool(true),
            value => return Err(FieldError::InvalidBool { value }),
        },
        FieldKind::Int { bits } => FieldValue::Int(match bits {
            8 => i64::from(reader.read_i8()?),
            16 => i64::from(reader.read_i16()?),
            32 => i64::from(reader.read_i32()?),
            64 => reader.read_i64()?,
            _ => return Err(FieldError::OutOfRange { kind }),
        }),
        FieldKind::UInt { bits } => FieldValue::UInt(match bits {
            8 => u64::from(reader.read_u8()?),
            16 => u64::from(reader.read_u16()?),
            32 => u64::from(reader.read_u32()?),
            64 => reader.read_u64()?,
            _ => return Err(FieldError::OutOfRange { kind }),
        }),
        FieldKind::Float { bits } => FieldValue::Float(match bits {
            32 => f64::from(reader.read_f32()?),
            64 => reader.read_f64()?,
            _ => return Err(FieldError::OutOfRange { kind }),
        }),
        FieldKind::String => FieldValue::String(reader.read_string()?),
        FieldKind::Vec2 => FieldValue::Vec2(reader.read_f32_array()?),
        FieldKind::Vec3 => FieldValue::Vec3(reader.read_f32_array()?),
        FieldKind::Vec4 => FieldValue::Vec4(reader.read_f32_array()?),
        FieldKind::Timestamp16 => FieldValue::Timestamp(i32::from(reader.read_u16()? as i16)),
    };
    Ok(value)
}
