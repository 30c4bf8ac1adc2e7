//! The client-side mirror of replicated state.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use clock::{ClockDelta, SyncOutcome, TimeSync};
use codec::{decode_snapshot, DecodedEntity, EntityId, SnapshotMode, SnapshotTick};
use command::{encode_usercmd_batch, CommandBuffer, UserCmd};
use log::{debug, info, warn};
use repgraph::ClientId;
use schema::{ClassId, ClassSchema, FieldId, FieldValue, Schema};
use wire::{
    ClientState, ClockSyncResponse, Disconnect, EntityDelete, Hello, HelloResponse, MessageType,
    Tick,
};

use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};

/// What the server told us in HELLO_RESP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub client_id: ClientId,
    pub player: EntityId,
    pub tick_rate: u8,
    pub world_name: String,
}

/// One mirrored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntity {
    class: ClassId,
    values: Vec<FieldValue>,
}

impl MirrorEntity {
    fn new(class: &ClassSchema) -> Self {
        Self {
            class: class.id(),
            values: class
                .fields()
                .iter()
                .map(|field| field.kind.default_value())
                .collect(),
        }
    }

    fn apply(&mut self, fields: Vec<(FieldId, FieldValue)>) {
        for (field, value) in fields {
            if let Some(slot) = self.values.get_mut(field.index()) {
                *slot = value;
            }
        }
    }

    #[must_use]
    pub const fn class(&self) -> ClassId {
        self.class
    }

    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, field: FieldId) -> Option<&FieldValue> {
        self.values.get(field.index())
    }
}

/// Entities touched by one applied snapshot datagram, for post-update hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotUpdate {
    pub tick: SnapshotTick,
    pub mode: SnapshotMode,
    /// More parts of this snapshot follow. Deletions implied by a full
    /// snapshot are reported with its last part.
    pub continued: bool,
    pub created: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub deleted: Vec<EntityId>,
    /// Records that could not be decoded.
    pub skipped: usize,
}

/// The result of handling one datagram from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected(ServerInfo),
    Tick { tick: i32, interval: f32 },
    Snapshot(SnapshotUpdate),
    EntityDeleted(EntityId),
    /// A clock sync response was processed. `resend` carries the repeated
    /// request when the result was not precise enough.
    ClockSync {
        outcome: SyncOutcome,
        resend: Option<Vec<u8>>,
    },
    Disconnected { reason: String },
}

/// Client connection state: the mirror of server entities, the outgoing
/// command buffer and the clock estimate.
#[derive(Debug)]
pub struct ClientSession {
    config: ClientConfig,
    schema: Arc<Schema>,
    server: Option<ServerInfo>,
    disconnected: Option<String>,
    entities: BTreeMap<EntityId, MirrorEntity>,
    /// Tick and entities of a full snapshot whose last part is pending.
    full_parts: Option<(SnapshotTick, BTreeSet<EntityId>)>,
    server_tick: Option<i32>,
    interval: f32,
    commands: CommandBuffer,
    clock: ClockDelta,
    time_sync: TimeSync,
}

impl ClientSession {
    pub fn new(config: ClientConfig, schema: Arc<Schema>) -> SessionResult<Self> {
        let clock = ClockDelta::new(config.clock)?;
        let commands = CommandBuffer::new(&config.commands);
        let time_sync = TimeSync::new(config.time_sync);
        Ok(Self {
            config,
            schema,
            server: None,
            disconnected: None,
            entities: BTreeMap::new(),
            full_parts: None,
            server_tick: None,
            interval: 0.0,
            commands,
            clock,
            time_sync,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub const fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.server.is_some() && self.disconnected.is_none()
    }

    #[must_use]
    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnected.as_deref()
    }

    #[must_use]
    pub const fn server_tick(&self) -> Option<i32> {
        self.server_tick
    }

    /// Seconds per server tick, once known.
    #[must_use]
    pub const fn interval(&self) -> f32 {
        self.interval
    }

    #[must_use]
    pub fn entity(&self, entity: EntityId) -> Option<&MirrorEntity> {
        self.entities.get(&entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &MirrorEntity)> + '_ {
        self.entities.iter().map(|(id, entity)| (*id, entity))
    }

    #[must_use]
    pub const fn clock(&self) -> &ClockDelta {
        &self.clock
    }

    #[must_use]
    pub const fn command_buffer(&self) -> &CommandBuffer {
        &self.commands
    }

    /// HELLO with our protocol version and schema hash.
    pub fn hello(&self) -> SessionResult<Vec<u8>> {
        let hello = Hello {
            protocol_version: self.config.protocol_version,
            schema_hash: self.schema.hash(),
        };
        Ok(wire::encode_message(&hello, &self.config.wire_limits)?)
    }

    pub fn client_state(&self, state: ClientState) -> SessionResult<Vec<u8>> {
        Ok(wire::encode_message(&state, &self.config.wire_limits)?)
    }

    /// TICK acknowledging the last server tick received.
    pub fn tick_ack(&self) -> SessionResult<Option<Vec<u8>>> {
        let Some(tick) = self.server_tick else {
            return Ok(None);
        };
        let ack = Tick {
            tick,
            interval: self.interval,
        };
        Ok(Some(wire::encode_message(&ack, &self.config.wire_limits)?))
    }

    pub fn disconnect(&mut self, reason: &str) -> SessionResult<Vec<u8>> {
        let notice = Disconnect {
            reason: reason.to_owned(),
        };
        let bytes = wire::encode_message(&notice, &self.config.wire_limits)?;
        self.disconnected = Some(reason.to_owned());
        Ok(bytes)
    }

    /// Starts a clock sync unless one began too recently.
    pub fn request_clock_sync(&mut self, now: f64, reason: &str) -> SessionResult<Option<Vec<u8>>> {
        self.time_sync
            .synchronize(now, reason)
            .map(|request| wire::encode_message(&request, &self.config.wire_limits))
            .transpose()
            .map_err(SessionError::from)
    }

    /// Records this tick's input. When `send` is set the pending commands go
    /// out as a USERCMD batch; otherwise the command is choked until the next
    /// send.
    ///
    /// The command number is assigned here; the caller fills in everything
    /// else, including `tick_count`.
    pub fn create_command(&mut self, cmd: UserCmd, send: bool) -> SessionResult<Option<Vec<u8>>> {
        self.commands.push(cmd);
        if !send {
            self.commands.choke();
            return Ok(None);
        }
        let batch = self.commands.take_batch();
        let bytes =
            encode_usercmd_batch(&batch, &self.config.commands, &self.config.wire_limits)?;
        Ok(Some(bytes))
    }

    /// Handles one datagram from the server.
    pub fn handle_datagram(&mut self, bytes: &[u8], now: f64) -> SessionResult<ClientEvent> {
        let limits = self.config.wire_limits.clone();
        let message = wire::decode_message(bytes, &limits)?;
        debug!("server: {} ({} bytes)", message.kind, bytes.len());

        if self.server.is_none()
            && !matches!(
                message.kind,
                MessageType::HelloResponse | MessageType::Disconnect
            )
        {
            return Err(SessionError::HandshakeIncomplete { kind: message.kind });
        }

        match message.kind {
            MessageType::HelloResponse => {
                let response: HelloResponse = wire::decode_body(&message, &limits)?;
                let info = ServerInfo {
                    client_id: ClientId(response.client_id),
                    player: EntityId::new(response.player_entity),
                    tick_rate: response.tick_rate,
                    world_name: response.world_name,
                };
                info!(
                    "connected to {} as client {}",
                    info.world_name, info.client_id.0
                );
                self.server = Some(info.clone());
                Ok(ClientEvent::Connected(info))
            }
            MessageType::Tick => {
                let tick: Tick = wire::decode_body(&message, &limits)?;
                self.server_tick = Some(tick.tick);
                self.interval = tick.interval;
                Ok(ClientEvent::Tick {
                    tick: tick.tick,
                    interval: tick.interval,
                })
            }
            MessageType::Snapshot => {
                let decoded =
                    decode_snapshot(&self.schema, &message, &self.config.codec_limits)?;
                for skipped in &decoded.skipped {
                    warn!(
                        "skipped entity {} in snapshot {}: {}",
                        skipped.entity.raw(),
                        decoded.tick.raw(),
                        skipped.error
                    );
                }
                let mut update = SnapshotUpdate {
                    tick: decoded.tick,
                    mode: decoded.mode,
                    continued: decoded.continued,
                    created: Vec::new(),
                    updated: Vec::new(),
                    deleted: Vec::new(),
                    skipped: decoded.skipped.len(),
                };
                match decoded.mode {
                    SnapshotMode::Full => self.apply_full(decoded.entities, &mut update),
                    SnapshotMode::Delta => self.apply_delta(decoded.entities, &mut update),
                }
                Ok(ClientEvent::Snapshot(update))
            }
            MessageType::EntityDelete => {
                let delete: EntityDelete = wire::decode_body(&message, &limits)?;
                let entity = EntityId::new(delete.entity_id);
                if self.entities.remove(&entity).is_none() {
                    debug!("delete for unknown entity {}", entity.raw());
                }
                Ok(ClientEvent::EntityDeleted(entity))
            }
            MessageType::ClockSyncResponse => {
                let response: ClockSyncResponse = wire::decode_body(&message, &limits)?;
                let outcome = self
                    .time_sync
                    .handle_response(&mut self.clock, now, &response);
                let resend = match outcome {
                    SyncOutcome::Retry(request) => Some(wire::encode_message(&request, &limits)?),
                    _ => None,
                };
                Ok(ClientEvent::ClockSync { outcome, resend })
            }
            MessageType::Disconnect => {
                let notice: Disconnect = wire::decode_body(&message, &limits)?;
                info!("server closed the connection: {}", notice.reason);
                self.disconnected = Some(notice.reason.clone());
                Ok(ClientEvent::Disconnected {
                    reason: notice.reason,
                })
            }
            kind => Err(SessionError::UnexpectedMessage { kind }),
        }
    }

    /// Applies one part of a full snapshot. Once its last part is in, the
    /// mirror holds exactly the entities the snapshot listed.
    fn apply_full(&mut self, decoded: Vec<DecodedEntity>, update: &mut SnapshotUpdate) {
        let mut listed = match self.full_parts.take() {
            Some((tick, listed)) if tick == update.tick => listed,
            _ => BTreeSet::new(),
        };
        for entity in decoded {
            let Some(class) = self.schema.class(entity.class) else {
                continue;
            };
            let mut mirror = MirrorEntity::new(class);
            mirror.apply(entity.fields);
            listed.insert(entity.entity);
            if self.entities.insert(entity.entity, mirror).is_some() {
                update.updated.push(entity.entity);
            } else {
                update.created.push(entity.entity);
            }
        }

        if update.continued {
            self.full_parts = Some((update.tick, listed));
            return;
        }
        update.deleted = self
            .entities
            .keys()
            .filter(|id| !listed.contains(id))
            .copied()
            .collect();
        self.entities.retain(|id, _| listed.contains(id));
    }

    fn apply_delta(&mut self, decoded: Vec<DecodedEntity>, update: &mut SnapshotUpdate) {
        for entity in decoded {
            let Some(class) = self.schema.class(entity.class) else {
                continue;
            };
            match self.entities.entry(entity.entity) {
                Entry::Occupied(mut slot) => {
                    if slot.get().class != entity.class {
                        // The id was reused for an object of another class.
                        slot.insert(MirrorEntity::new(class));
                    }
                    slot.get_mut().apply(entity.fields);
                    update.updated.push(entity.entity);
                }
                Entry::Vacant(slot) => {
                    slot.insert(MirrorEntity::new(class)).apply(entity.fields);
                    update.created.push(entity.entity);
                }
            }
        }
    }
}
