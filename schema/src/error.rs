//! Schema and field codec errors.

use std::fmt;

use bytestream::ByteError;

use crate::{ClassId, FieldKind};

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for field encoding/decoding.
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors that can occur when building a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The class id was never registered.
    UnknownClass { class: ClassId },

    /// More classes than a `u16` class id can address.
    TooManyClasses { count: usize },

    /// A class would exceed 255 fields (field ids are one byte on the wire).
    TooManyFields { class: ClassId, count: usize },

    /// A field name was registered twice with different kinds.
    ConflictingField {
        class: ClassId,
        name: String,
        existing: FieldKind,
        requested: FieldKind,
    },

    /// Invalid bit width for the field kind.
    InvalidBitWidth { kind: FieldKind },
}

/// Errors that can occur when encoding or decoding a single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Underlying byte cursor error (including truncated input).
    Byte(ByteError),

    /// The value variant does not match the field kind.
    TypeMismatch {
        kind: FieldKind,
        found: &'static str,
    },

    /// The value does not fit in the declared width.
    OutOfRange { kind: FieldKind },

    /// A boolean byte other than 0 or 1.
    InvalidBool { value: u8 },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClass { class } => write!(f, "unknown class id {}", class.get()),
            Self::TooManyClasses { count } => {
                write!(f, "too many classes: {count} exceeds the u16 id space")
            }
            Self::TooManyFields { class, count } => {
                write!(
                    f,
                    "class {} has {count} fields, at most 255 are allowed",
                    class.get()
                )
            }
            Self::ConflictingField {
                class,
                name,
                existing,
                requested,
            } => {
                write!(
                    f,
                    "field '{name}' of class {} already registered as {existing:?}, not {requested:?}",
                    class.get()
                )
            }
            Self::InvalidBitWidth { kind } => write!(f, "invalid bit width for {kind:?}"),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(err) => write!(f, "{err}"),
            Self::TypeMismatch { kind, found } => {
                write!(f, "type mismatch: field is {kind:?}, value is {found}")
            }
            Self::OutOfRange { kind } => write!(f, "value out of range for {kind:?}"),
            Self::InvalidBool { value } => write!(f, "invalid bool byte {value}"),
        }
    }
}

impl std::error::Error for SchemaError {}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Byte(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ByteError> for FieldError {
    fn from(err: ByteError) -> Self {
        Self::Byte(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_fields_display() {
        let err = SchemaError::TooManyFields {
            class: ClassId::new(3),
            count: 256,
        };
        let msg = err.to_string();
        assert!(msg.contains("256"));
        assert!(msg.contains("255"));
    }

    #[test]
    fn field_error_wraps_truncation() {
        let err: FieldError = ByteError::TruncatedInput {
            requested: 4,
            available: 0,
        }
        .into();
        assert!(err.to_string().contains("truncated"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
