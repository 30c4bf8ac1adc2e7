//! Error types for wire format operations.

use std::fmt;

use bytestream::ByteError;

use crate::MessageType;

/// Result type for wire decoding.
pub type WireResult<T> = Result<T, DecodeError>;

/// Decode errors for message framing and control messages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Byte cursor error, most often truncated input.
    Byte(ByteError),

    /// Datagram is too small to contain the message tag.
    MessageTooSmall { actual: usize, required: usize },

    /// Unknown message tag.
    UnknownMessageType { tag: u16 },

    /// The body was decoded as the wrong message type.
    UnexpectedMessageType {
        expected: MessageType,
        found: MessageType,
    },

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Bytes left over after a fixed-layout body.
    TrailingBytes {
        message: MessageType,
        remaining: usize,
    },

    /// A client state byte that names no known state.
    InvalidClientState { value: u8 },
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    MessageBytes,
    StringBytes,
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Byte cursor error, e.g. a string longer than its prefix allows.
    Byte(ByteError),

    /// Limits exceeded.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(err) => write!(f, "{err}"),
            Self::MessageTooSmall { actual, required } => {
                write!(
                    f,
                    "message too small: {actual} bytes, need at least {required}"
                )
            }
            Self::UnknownMessageType { tag } => write!(f, "unknown message type: {tag}"),
            Self::UnexpectedMessageType { expected, found } => {
                write!(f, "expected {expected} message, found {found}")
            }
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
            Self::TrailingBytes { message, remaining } => {
                write!(f, "{remaining} trailing bytes after {message} message")
            }
            Self::InvalidClientState { value } => write!(f, "invalid client state: {value}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageBytes => "message bytes",
            Self::StringBytes => "string bytes",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(err) => write!(f, "{err}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => {
                write!(f, "{kind} limit exceeded: {actual} > {limit}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl std::error::Error for EncodeError {}

impl From<ByteError> for DecodeError {
    fn from(err: ByteError) -> Self {
        Self::Byte(err)
    }
}

impl From<ByteError> for EncodeError {
    fn from(err: ByteError) -> Self {
        Self::Byte(err)
    }
}
