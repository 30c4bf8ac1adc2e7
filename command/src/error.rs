//! Error types for command handling.

use std::fmt;

use bytestream::ByteError;

/// Result type for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors raised while decoding or queueing user commands.
///
/// None of these is fatal for a connection: the offending batch is dropped
/// (or, for [`CommandError::ExcessiveDroppedPackets`], run without gap fill).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandError {
    /// Byte cursor error, most often truncated input.
    Byte(ByteError),

    /// Message framing error.
    Wire(wire::DecodeError),

    /// The encoded batch violates the wire limits.
    Encode(wire::EncodeError),

    /// A batch declaring more commands than the server accepts.
    TooManyCommands { total: usize, limit: usize },

    /// A batch with no new commands.
    NoNewCommands,

    /// Bytes left over after the declared commands.
    TrailingBytes { remaining: usize },

    /// A second USERCMD in the same server tick.
    DuplicateBatch { tick: i32 },

    /// A batch whose newest command was already received.
    StaleBatch { newest: u32, last_received: u32 },

    /// More commands lost than gap fill will reconstruct.
    ExcessiveDroppedPackets { dropped: u32, limit: u32 },

    /// The queue was full and its oldest context was discarded.
    TooManyContexts { limit: usize },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(e) => write!(f, "byte error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::TooManyCommands { total, limit } => {
                write!(f, "too many commands: {total} > {limit}")
            }
            Self::NoNewCommands => write!(f, "batch carries no new commands"),
            Self::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after user commands")
            }
            Self::DuplicateBatch { tick } => {
                write!(f, "more than one command batch in tick {tick}")
            }
            Self::StaleBatch {
                newest,
                last_received,
            } => {
                write!(
                    f,
                    "stale batch: newest command {newest}, already received {last_received}"
                )
            }
            Self::ExcessiveDroppedPackets { dropped, limit } => {
                write!(
                    f,
                    "{dropped} dropped commands exceeds gap fill limit {limit}"
                )
            }
            Self::TooManyContexts { limit } => {
                write!(f, "command context limit {limit} reached, oldest discarded")
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Byte(e) => Some(e),
            Self::Wire(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ByteError> for CommandError {
    fn from(err: ByteError) -> Self {
        Self::Byte(err)
    }
}

impl From<wire::DecodeError> for CommandError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Wire(err)
    }
}

impl From<wire::EncodeError> for CommandError {
    fn from(err: wire::EncodeError) -> Self {
        Self::Encode(err)
    }
}
