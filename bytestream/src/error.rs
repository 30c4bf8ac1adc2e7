//! Error types for byte cursor operations.

use std::fmt;

/// Result type for byte cursor operations.
pub type ByteResult<T> = Result<T, ByteError>;

/// Errors that can occur while reading or writing the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteError {
    /// The cursor ran out of bytes in the middle of a value.
    TruncatedInput {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes left in the buffer.
        available: usize,
    },

    /// A length-prefixed value is longer than its `u16` prefix can describe.
    LengthOverflow {
        /// Length of the value in bytes.
        length: usize,
    },

    /// A string payload was not valid UTF-8.
    InvalidUtf8 {
        /// Byte offset of the string payload within the buffer.
        position: usize,
    },

    /// A back-patch targeted bytes that were never reserved.
    InvalidPatch {
        /// Offset of the patch.
        position: usize,
        /// Number of bytes written so far.
        written: usize,
    },
}

impl fmt::Display for ByteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedInput {
                requested,
                available,
            } => {
                write!(
                    f,
                    "truncated input: needed {requested} bytes but only {available} bytes available"
                )
            }
            Self::LengthOverflow { length } => {
                write!(f, "length {length} does not fit in a u16 prefix")
            }
            Self::InvalidUtf8 { position } => {
                write!(f, "invalid UTF-8 in string at byte {position}")
            }
            Self::InvalidPatch { position, written } => {
                write!(
                    f,
                    "cannot patch at byte {position}, only {written} bytes written"
                )
            }
        }
    }
}

impl std::error::Error for ByteError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_truncated_input() {
        let err = ByteError::TruncatedInput {
            requested: 4,
            available: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("truncated"), "should name the failure");
        assert!(msg.contains("4 bytes"), "should mention requested bytes");
        assert!(msg.contains("1 bytes"), "should mention available bytes");
    }

    #[test]
    fn error_display_length_overflow() {
        let err = ByteError::LengthOverflow { length: 70_000 };
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn error_display_invalid_utf8() {
        let err = ByteError::InvalidUtf8 { position: 12 };
        let msg = err.to_string();
        assert!(msg.contains("UTF-8"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn error_equality() {
        let err1 = ByteError::TruncatedInput {
            requested: 8,
            available: 3,
        };
        let err2 = ByteError::TruncatedInput {
            requested: 8,
            available: 3,
        };
        let err3 = ByteError::TruncatedInput {
            requested: 8,
            available: 4,
        };
        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<ByteError>();
    }
}
