//! Message framing and control messages for the tickwire protocol.
//!
//! Every datagram is a little-endian `u16` message tag followed by a body.
//! This crate owns the tag table, datagram limits, and the fixed-layout
//! control messages. Snapshot and user-command bodies depend on the schema
//! and are encoded by higher layers on top of [`begin_message`].
//!
//! # Design Principles
//!
//! - **Stable wire format** - Tags and layouts are versioned through [`PROTOCOL_VERSION`].
//! - **Bounded decoding** - Datagram and string sizes are validated against [`Limits`].
//! - **No domain knowledge** - This crate handles framing, not game state.

mod control;
mod error;
mod limits;
mod message;

pub use control::{
    ClientState, ClockSyncRequest, ClockSyncResponse, Disconnect, EntityDelete, Hello,
    HelloResponse, Tick,
};
pub use error::{DecodeError, EncodeError, LimitKind, WireResult};
pub use limits::Limits;
pub use message::{
    begin_message, decode_body, decode_message, encode_message, finish_message,
    read_bounded_string, write_bounded_string, Message, MessageType, WireMessage, TAG_SIZE,
};

/// Protocol version exchanged in HELLO.
pub const PROTOCOL_VERSION: u16 = 1;
