//! Message framing: a `u16` tag followed by a body.

use std::fmt;

use bytestream::{ByteReader, ByteWriter};

use crate::error::{DecodeError, EncodeError, LimitKind, WireResult};
use crate::limits::Limits;

/// Size of the message tag that opens every datagram.
pub const TAG_SIZE: usize = 2;

/// Message kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u16)]
pub enum MessageType {
    Hello = 1,
    HelloResponse = 2,
    ClientState = 3,
    Tick = 4,
    UserCmd = 5,
    Snapshot = 6,
    EntityDelete = 7,
    ClockSyncRequest = 8,
    ClockSyncResponse = 9,
    Disconnect = 10,
}

impl MessageType {
    /// Parses a message type from a raw tag.
    pub fn parse(tag: u16) -> Result<Self, DecodeError> {
        match tag {
            1 => Ok(Self::Hello),
            2 => Ok(Self::HelloResponse),
            3 => Ok(Self::ClientState),
            4 => Ok(Self::Tick),
            5 => Ok(Self::UserCmd),
            6 => Ok(Self::Snapshot),
            7 => Ok(Self::EntityDelete),
            8 => Ok(Self::ClockSyncRequest),
            9 => Ok(Self::ClockSyncResponse),
            10 => Ok(Self::Disconnect),
            _ => Err(DecodeError::UnknownMessageType { tag }),
        }
    }

    #[must_use]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::HelloResponse => "HELLO_RESP",
            Self::ClientState => "CLIENT_STATE",
            Self::Tick => "TICK",
            Self::UserCmd => "USERCMD",
            Self::Snapshot => "SNAPSHOT",
            Self::EntityDelete => "ENTITY_DELETE",
            Self::ClockSyncRequest => "CLOCK_SYNC_REQUEST",
            Self::ClockSyncResponse => "CLOCK_SYNC_RESPONSE",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A framed datagram: its kind and a borrowed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireMessage<'a> {
    pub kind: MessageType,
    pub body: &'a [u8],
}

impl<'a> WireMessage<'a> {
    /// A reader positioned at the start of the body.
    #[must_use]
    pub fn reader(&self) -> ByteReader<'a> {
        ByteReader::new(self.body)
    }

    /// Fails unless this message has the expected kind.
    pub fn expect(&self, expected: MessageType) -> WireResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedMessageType {
                expected,
                found: self.kind,
            })
        }
    }
}

/// Splits a datagram into its tag and body.
pub fn decode_message<'a>(buf: &'a [u8], limits: &Limits) -> WireResult<WireMessage<'a>> {
    if buf.len() < TAG_SIZE {
        return Err(DecodeError::MessageTooSmall {
            actual: buf.len(),
            required: TAG_SIZE,
        });
    }
    if buf.len() > limits.max_message_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::MessageBytes,
            limit: limits.max_message_bytes,
            actual: buf.len(),
        });
    }

    let mut reader = ByteReader::new(buf);
    let kind = MessageType::parse(reader.read_u16()?)?;
    Ok(WireMessage {
        kind,
        body: reader.rest(),
    })
}

/// Starts a datagram of the given kind; the caller appends the body.
#[must_use]
pub fn begin_message(kind: MessageType) -> ByteWriter {
    let mut out = ByteWriter::with_capacity(64);
    out.write_u16(kind.tag());
    out
}

/// Finishes a datagram, enforcing the message size limit.
pub fn finish_message(out: ByteWriter, limits: &Limits) -> Result<Vec<u8>, EncodeError> {
    if out.len() > limits.max_message_bytes {
        return Err(EncodeError::LimitsExceeded {
            kind: LimitKind::MessageBytes,
            limit: limits.max_message_bytes,
            actual: out.len(),
        });
    }
    Ok(out.finish())
}

/// A message with a fixed, self-contained body layout.
pub trait Message: Sized {
    const KIND: MessageType;

    fn encode_body(&self, out: &mut ByteWriter, limits: &Limits) -> Result<(), EncodeError>;

    fn decode_body(reader: &mut ByteReader<'_>, limits: &Limits) -> WireResult<Self>;
}

/// Encodes a complete datagram for `message`.
pub fn encode_message<M: Message>(message: &M, limits: &Limits) -> Result<Vec<u8>, EncodeError> {
    let mut out = begin_message(M::KIND);
    message.encode_body(&mut out, limits)?;
    finish_message(out, limits)
}

/// Decodes the body of an already-framed message, rejecting trailing bytes.
pub fn decode_body<M: Message>(message: &WireMessage<'_>, limits: &Limits) -> WireResult<M> {
    message.expect(M::KIND)?;
    let mut reader = message.reader();
    let decoded = M::decode_body(&mut reader, limits)?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            message: M::KIND,
            remaining: reader.remaining(),
        });
    }
    Ok(decoded)
}

/// Writes a length-prefixed string after checking the string limit.
pub fn write_bounded_string(
    out: &mut ByteWriter,
    value: &str,
    limits: &Limits,
) -> Result<(), EncodeError> {
    if value.len() > limits.max_string_bytes {
        return Err(EncodeError::LimitsExceeded {
            kind: LimitKind::StringBytes,
            limit: limits.max_string_bytes,
            actual: value.len(),
        });
    }
    out.write_string(value)?;
    Ok(())
}

/// Reads a length-prefixed string and checks the string limit.
pub fn read_bounded_string(reader: &mut ByteReader<'_>, limits: &Limits) -> WireResult<String> {
    let value = reader.read_string()?;
    if value.len() > limits.max_string_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::StringBytes,
            limit: limits.max_string_bytes,
            actual: value.len(),
        });
    }
    Ok(value)
}
