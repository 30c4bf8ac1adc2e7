//! Server and client sessions for tickwire.
//!
//! [`ServerContext`] owns the replicated objects, one connection per client
//! and the server tick. Each tick it runs queued user commands through the
//! game's [`Simulation`], then sends every playing client a TICK, pending
//! entity deletes and a delta snapshot. [`ClientSession`] is the other end:
//! it mirrors the server's entities, numbers and batches user commands and
//! keeps a clock estimate synchronized with the server.
//!
//! Datagrams leave through a [`Transport`]. Errors that concern one
//! connection end that connection and never the server.

mod client;
mod config;
mod error;
mod game;
mod server;
mod transport;

pub use client::{ClientEvent, ClientSession, MirrorEntity, ServerInfo, SnapshotUpdate};
pub use config::{ClientConfig, ServerConfig};
pub use error::{SessionError, SessionResult};
pub use game::{PlayerContext, PlayerFactory, Simulation};
pub use server::{DisconnectEvent, DisconnectReason, ServerContext, TickReport};
pub use transport::{MemoryTransport, Transport, TransportError};
