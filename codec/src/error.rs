//! Error types for codec operations.

use std::fmt;

use bytestream::ByteError;
use schema::{ClassId, FieldError, FieldId};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during snapshot encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Message framing error.
    Wire(wire::DecodeError),

    /// The finished datagram violates the wire limits.
    Encode(wire::EncodeError),

    /// Byte cursor error, most often truncated input.
    Byte(ByteError),

    /// A class id the local schema does not know.
    UnknownClassId { class: u16 },

    /// A field id outside the class's field list.
    UnknownFieldId { class: ClassId, field: u8 },

    /// A field value failed to encode or decode.
    Field {
        class: ClassId,
        field: FieldId,
        source: FieldError,
    },

    /// A full record whose field count disagrees with the class.
    FieldCountMismatch {
        class: ClassId,
        expected: usize,
        actual: usize,
    },

    /// An unknown snapshot mode byte.
    InvalidMode { value: u8 },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Bytes left in an entity record after its declared fields.
    TrailingRecordBytes { remaining: usize },
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Entities,
    FieldsPerEntity,
    RecordBytes,
    /// The record did not fit in the datagram's byte budget.
    DatagramBytes,
}

impl CodecError {
    /// Whether an encoder refused a record only because its datagram is full.
    ///
    /// The same record can still go into a fresh datagram.
    #[must_use]
    pub const fn is_datagram_full(&self) -> bool {
        matches!(
            self,
            Self::LimitsExceeded {
                kind: LimitKind::Entities | LimitKind::DatagramBytes,
                ..
            }
        )
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Byte(e) => write!(f, "byte error: {e}"),
            Self::UnknownClassId { class } => write!(f, "unknown class id {class}"),
            Self::UnknownFieldId { class, field } => {
                write!(f, "unknown field id {field} for class {}", class.get())
            }
            Self::Field {
                class,
                field,
                source,
            } => {
                write!(
                    f,
                    "field {} of class {}: {source}",
                    field.get(),
                    class.get()
                )
            }
            Self::FieldCountMismatch {
                class,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "class {} has {expected} fields, record has {actual}",
                    class.get()
                )
            }
            Self::InvalidMode { value } => write!(f, "invalid snapshot mode {value}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::TrailingRecordBytes { remaining } => {
                write!(f, "{remaining} trailing bytes in entity record")
            }
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entities => "entities",
            Self::FieldsPerEntity => "fields per entity",
            Self::RecordBytes => "record bytes",
            Self::DatagramBytes => "datagram bytes",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wire(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Byte(e) => Some(e),
            Self::Field { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<wire::DecodeError> for CodecError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Wire(err)
    }
}

impl From<wire::EncodeError> for CodecError {
    fn from(err: wire::EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<ByteError> for CodecError {
    fn from(err: ByteError) -> Self {
        Self::Byte(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_class() {
        let err = CodecError::UnknownClassId { class: 77 };
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn display_limits_exceeded() {
        let err = CodecError::LimitsExceeded {
            kind: LimitKind::Entities,
            limit: 4,
            actual: 9,
        };
        let msg = err.to_string();
        assert!(msg.contains("entities"));
        assert!(msg.contains('9'));
    }

    #[test]
    fn full_datagram_is_distinguished_from_bad_records() {
        let full = CodecError::LimitsExceeded {
            kind: LimitKind::DatagramBytes,
            limit: 100,
            actual: 120,
        };
        assert!(full.is_datagram_full());
        let too_big = CodecError::LimitsExceeded {
            kind: LimitKind::RecordBytes,
            limit: 100,
            actual: 120,
        };
        assert!(!too_big.is_datagram_full());
        assert!(!CodecError::UnknownClassId { class: 1 }.is_datagram_full());
    }

    #[test]
    fn source_chains_field_error() {
        use std::error::Error;
        let err = CodecError::Field {
            class: ClassId::new(1),
            field: FieldId::new(2),
            source: FieldError::InvalidBool { value: 3 },
        };
        assert!(err.source().is_some());
    }
}
