//! Fixed-layout control messages.
//!
//! Snapshot and user-command bodies are variable and schema-dependent; they
//! live in `codec` and `command` and reuse the framing in [`crate::message`].

use bytestream::{ByteReader, ByteWriter};

use crate::error::{DecodeError, EncodeError, WireResult};
use crate::limits::Limits;
use crate::message::{read_bounded_string, write_bounded_string, Message, MessageType};

/// HELLO: the client announces its protocol version and schema hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub protocol_version: u16,
    pub schema_hash: u64,
}

/// HELLO_RESP: the server accepts the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloResponse {
    pub tick_rate: u8,
    pub client_id: u16,
    pub player_entity: u32,
    pub world_name: String,
}

/// Client connection state, as reported by CLIENT_STATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ClientState {
    /// Connected but still loading; receives no ticks or snapshots.
    #[default]
    None = 0,
    Playing = 1,
}

impl ClientState {
    pub fn parse(value: u8) -> WireResult<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Playing),
            _ => Err(DecodeError::InvalidClientState { value }),
        }
    }
}

/// TICK: a server tick number and tick interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub tick: i32,
    pub interval: f32,
}

/// ENTITY_DELETE: the entity no longer exists on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDelete {
    pub entity_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSyncRequest {
    pub context: u8,
}

/// CLOCK_SYNC_RESPONSE: the server's 32-bit network time for a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSyncResponse {
    pub context: u8,
    pub timestamp: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Message for Hello {
    const KIND: MessageType = MessageType::Hello;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_u16(self.protocol_version);
        out.write_u64(self.schema_hash);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            protocol_version: reader.read_u16()?,
            schema_hash: reader.read_u64()?,
        })
    }
}

impl Message for HelloResponse {
    const KIND: MessageType = MessageType::HelloResponse;

    fn encode_body(&self, out: &mut ByteWriter, limits: &Limits) -> Result<(), EncodeError> {
        out.write_u8(self.tick_rate);
        out.write_u16(self.client_id);
        out.write_u32(self.player_entity);
        write_bounded_string(out, &self.world_name, limits)
    }

    fn decode_body(reader: &mut ByteReader<'_>, limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            tick_rate: reader.read_u8()?,
            client_id: reader.read_u16()?,
            player_entity: reader.read_u32()?,
            world_name: read_bounded_string(reader, limits)?,
        })
    }
}

impl Message for ClientState {
    const KIND: MessageType = MessageType::ClientState;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_u8(*self as u8);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Self::parse(reader.read_u8()?)
    }
}

impl Message for Tick {
    const KIND: MessageType = MessageType::Tick;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_i32(self.tick);
        out.write_f32(self.interval);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            tick: reader.read_i32()?,
            interval: reader.read_f32()?,
        })
    }
}

impl Message for EntityDelete {
    const KIND: MessageType = MessageType::EntityDelete;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_u32(self.entity_id);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            entity_id: reader.read_u32()?,
        })
    }
}

impl Message for ClockSyncRequest {
    const KIND: MessageType = MessageType::ClockSyncRequest;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_u8(self.context);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            context: reader.read_u8()?,
        })
    }
}

impl Message for ClockSyncResponse {
    const KIND: MessageType = MessageType::ClockSyncResponse;

    fn encode_body(&self, out: &mut ByteWriter, _limits: &Limits) -> Result<(), EncodeError> {
        out.write_u8(self.context);
        out.write_i32(self.timestamp);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, _limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            context: reader.read_u8()?,
            timestamp: reader.read_i32()?,
        })
    }
}

impl Message for Disconnect {
    const KIND: MessageType = MessageType::Disconnect;

    fn encode_body(&self, out: &mut ByteWriter, limits: &Limits) -> Result<(), EncodeError> {
        write_bounded_string(out, &self.reason, limits)
    }

    fn decode_body(reader: &mut ByteReader<'_>, limits: &Limits) -> WireResult<Self> {
        Ok(Self {
            reason: read_bounded_string(reader, limits)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{decode_body, decode_message, encode_message};

    fn roundtrip<M: Message>(message: &M) -> M {
        let limits = Limits::default();
        let bytes = encode_message(message, &limits).unwrap();
        let framed = decode_message(&bytes, &limits).unwrap();
        assert_eq!(framed.kind, M::KIND);
        decode_body(&framed, &limits).unwrap()
    }

    #[test]
    fn hello_layout() {
        let hello = Hello {
            protocol_version: 3,
            schema_hash: 0x0102_0304_0506_0708,
        };
        let bytes = encode_message(&hello, &Limits::default()).unwrap();
        assert_eq!(bytes.len(), 2 + 2 + 8);
        assert_eq!(&bytes[..4], &[1, 0, 3, 0]);
        assert_eq!(roundtrip(&hello), hello);
    }

    #[test]
    fn hello_response_roundtrip() {
        let resp = HelloResponse {
            tick_rate: 66,
            client_id: 0xFFFF,
            player_entity: 17,
            world_name: "de_dust".to_string(),
        };
        assert_eq!(roundtrip(&resp), resp);
    }

    #[test]
    fn client_state_rejects_unknown_value() {
        let bytes = [3, 0, 9];
        let framed = decode_message(&bytes, &Limits::default()).unwrap();
        let err = decode_body::<ClientState>(&framed, &Limits::default()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidClientState { value: 9 });
        assert_eq!(roundtrip(&ClientState::Playing), ClientState::Playing);
    }

    #[test]
    fn tick_negative_and_interval() {
        let tick = Tick {
            tick: -5,
            interval: 1.0 / 66.0,
        };
        assert_eq!(roundtrip(&tick), tick);
    }

    #[test]
    fn clock_sync_roundtrip() {
        let req = ClockSyncRequest { context: 255 };
        assert_eq!(roundtrip(&req), req);
        let resp = ClockSyncResponse {
            context: 4,
            timestamp: i32::MIN,
        };
        assert_eq!(roundtrip(&resp), resp);
    }

    #[test]
    fn disconnect_empty_reason() {
        let msg = Disconnect {
            reason: String::new(),
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode_message(&EntityDelete { entity_id: 9 }, &Limits::default()).unwrap();
        bytes.push(0);
        let framed = decode_message(&bytes, &Limits::default()).unwrap();
        let err = decode_body::<EntityDelete>(&framed, &Limits::default()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TrailingBytes {
                message: MessageType::EntityDelete,
                remaining: 1
            }
        );
    }

    #[test]
    fn truncated_body_is_byte_error() {
        let bytes = encode_message(&Tick { tick: 1, interval: 0.5 }, &Limits::default()).unwrap();
        let framed = decode_message(&bytes[..5], &Limits::default()).unwrap();
        let err = decode_body::<Tick>(&framed, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Byte(_)));
    }

    #[test]
    fn wrong_kind_rejected() {
        let bytes = encode_message(&ClockSyncRequest { context: 1 }, &Limits::default()).unwrap();
        let framed = decode_message(&bytes, &Limits::default()).unwrap();
        assert!(matches!(
            decode_body::<EntityDelete>(&framed, &Limits::default()),
            Err(DecodeError::UnexpectedMessageType { .. })
        ));
    }
}
