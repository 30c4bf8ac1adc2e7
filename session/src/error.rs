//! Session error types.

use std::fmt;

use clock::ClockError;
use codec::CodecError;
use command::CommandError;
use repgraph::{ClientId, GraphError};
use wire::{DecodeError, EncodeError, MessageType};

use crate::transport::TransportError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by the server context and the client mirror.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    /// A datagram or call referenced a client that is not connected.
    ClientNotFound { client: ClientId },

    /// HELLO carried a protocol version or schema hash we do not speak.
    SchemaVersionMismatch {
        expected_version: u16,
        found_version: u16,
        expected_hash: u64,
        found_hash: u64,
    },

    /// A message that needs a completed handshake arrived before it. The
    /// datagram is dropped; the transport may have reordered it.
    HandshakeIncomplete { kind: MessageType },

    /// A message that is not valid in this direction.
    UnexpectedMessage { kind: MessageType },

    /// Every client id is in use.
    TooManyClients { limit: usize },

    /// The transport refused a datagram for this client.
    Transport {
        client: ClientId,
        source: TransportError,
    },

    Wire(DecodeError),
    Encode(EncodeError),
    Codec(CodecError),
    Command(CommandError),
    Graph(GraphError),
    Clock(ClockError),
}

impl SessionError {
    /// Whether the error ends the connection it occurred on.
    ///
    /// Most command errors are contained to the offending batch, early
    /// messages are dropped, and unknown clients have no connection to end.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        match self {
            Self::SchemaVersionMismatch { .. }
            | Self::UnexpectedMessage { .. }
            | Self::Transport { .. }
            | Self::Wire(_)
            | Self::Codec(_) => true,
            Self::Command(err) => matches!(
                err,
                CommandError::Byte(_) | CommandError::Wire(_) | CommandError::TrailingBytes { .. }
            ),
            _ => false,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientNotFound { client } => write!(f, "client {} not found", client.0),
            Self::SchemaVersionMismatch {
                expected_version,
                found_version,
                expected_hash,
                found_hash,
            } => write!(
                f,
                "schema mismatch: protocol {found_version} (expected {expected_version}), \
                 hash {found_hash:#018x} (expected {expected_hash:#018x})"
            ),
            Self::HandshakeIncomplete { kind } => {
                write!(f, "{kind} received before the handshake completed")
            }
            Self::UnexpectedMessage { kind } => write!(f, "unexpected {kind} message"),
            Self::TooManyClients { limit } => write!(f, "client limit {limit} reached"),
            Self::Transport { client, source } => {
                write!(f, "send to client {} failed: {source}", client.0)
            }
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Command(e) => write!(f, "command error: {e}"),
            Self::Graph(e) => write!(f, "replication error: {e}"),
            Self::Clock(e) => write!(f, "clock error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            Self::Wire(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Command(e) => Some(e),
            Self::Graph(e) => Some(e),
            Self::Clock(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for SessionError {
    fn from(err: DecodeError) -> Self {
        Self::Wire(err)
    }
}

impl From<EncodeError> for SessionError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

impl From<CommandError> for SessionError {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

impl From<GraphError> for SessionError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

impl From<ClockError> for SessionError {
    fn from(err: ClockError) -> Self {
        Self::Clock(err)
    }
}
