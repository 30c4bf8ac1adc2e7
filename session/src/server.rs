//! The authoritative server context.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use clock::ClockDelta;
use codec::{EntityId, SnapshotMode, SnapshotTick};
use command::{decode_usercmd_batch, CommandQueue, TickBase};
use log::{debug, error, info, warn};
use repgraph::{ClientId, ReplicationGraph};
use schema::Schema;
use wire::{
    ClientState, ClockSyncRequest, ClockSyncResponse, Disconnect, EntityDelete, Hello,
    HelloResponse, MessageType, Tick,
};

use crate::config::ServerConfig;
use crate::error::{SessionError, SessionResult};
use crate::game::{PlayerContext, PlayerFactory, Simulation};
use crate::transport::Transport;

/// Why a client left.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The client sent DISCONNECT.
    ClientLeft { reason: String },
    /// The server dropped the client.
    Kicked { reason: String },
    /// A per-connection error ended the connection.
    Error(SessionError),
}

/// A client that is gone, with the player entity it controlled.
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectEvent {
    pub client: ClientId,
    pub player: EntityId,
    pub reason: DisconnectReason,
}

/// What one server tick did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    /// The tick number after advancing.
    pub tick: i32,
    pub commands_run: usize,
    /// SNAPSHOT datagrams sent, every part of a split snapshot counted.
    pub snapshots_sent: usize,
    pub snapshot_bytes: usize,
    /// Largest distance between this tick and the last tick a playing
    /// client acknowledged, over clients that have acknowledged one.
    pub max_ack_lag: Option<i32>,
    pub disconnects: Vec<DisconnectEvent>,
}

#[derive(Debug)]
struct Connection {
    state: ClientState,
    greeted: bool,
    player: EntityId,
    commands: CommandQueue,
    tick_base: TickBase,
    acked_tick: Option<i32>,
}

/// Server state: the schema, the live objects, every connection and the
/// server clock.
///
/// All mutation happens on the simulation thread through `&mut self`. Game
/// code plugs in through [`Simulation`] and [`PlayerFactory`]; datagrams go
/// out through a [`Transport`].
#[derive(Debug)]
pub struct ServerContext {
    config: ServerConfig,
    graph: ReplicationGraph,
    connections: BTreeMap<ClientId, Connection>,
    free_ids: BTreeSet<u16>,
    next_id: u32,
    clock: ClockDelta,
    tick: i32,
    paused: bool,
}

impl ServerContext {
    pub fn new(config: ServerConfig, schema: Arc<Schema>) -> SessionResult<Self> {
        let clock = ClockDelta::new(config.clock)?;
        let graph = ReplicationGraph::new(schema, config.replication.clone());
        Ok(Self {
            config,
            graph,
            connections: BTreeMap::new(),
            free_ids: BTreeSet::new(),
            next_id: 1,
            clock,
            tick: 0,
            paused: false,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.graph.schema()
    }

    #[must_use]
    pub const fn graph(&self) -> &ReplicationGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ReplicationGraph {
        &mut self.graph
    }

    #[must_use]
    pub const fn tick(&self) -> i32 {
        self.tick
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, incoming commands keep their numbering but lose all
    /// movement and buttons.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.connections.keys().copied()
    }

    #[must_use]
    pub fn client_state(&self, client: ClientId) -> Option<ClientState> {
        self.connections.get(&client).map(|conn| conn.state)
    }

    #[must_use]
    pub fn player(&self, client: ClientId) -> Option<EntityId> {
        self.connections.get(&client).map(|conn| conn.player)
    }

    #[must_use]
    pub fn tick_base(&self, client: ClientId) -> Option<i32> {
        self.connections.get(&client).map(|conn| conn.tick_base.get())
    }

    /// The last server tick the client acknowledged.
    #[must_use]
    pub fn acked_tick(&self, client: ClientId) -> Option<i32> {
        self.connections.get(&client).and_then(|conn| conn.acked_tick)
    }

    /// 32-bit network time at local time `now`.
    #[must_use]
    pub fn network_time(&self, now: f64) -> i32 {
        self.clock
            .local_to_network_time_with(now, 32, self.clock.config().network_time_precision)
    }

    /// Accepts a new connection: allocates a client id, spawns the player
    /// and sends HELLO_RESP. The client starts in state NONE.
    pub fn connect<T, P>(&mut self, transport: &mut T, players: &mut P) -> SessionResult<ClientId>
    where
        T: Transport,
        P: PlayerFactory,
    {
        let client = self.allocate_id()?;
        let player = match players.spawn_player(&mut self.graph, client) {
            Ok(player) => player,
            Err(err) => {
                self.free_ids.insert(client.0);
                return Err(err.into());
            }
        };
        self.connections.insert(
            client,
            Connection {
                state: ClientState::None,
                greeted: false,
                player,
                commands: CommandQueue::new(self.config.commands.clone()),
                tick_base: TickBase::new(self.config.tick_base),
                acked_tick: None,
            },
        );

        let response = HelloResponse {
            tick_rate: self.config.tick_rate,
            client_id: client.0,
            player_entity: player.raw(),
            world_name: self.config.world_name.clone(),
        };
        if let Err(err) = self.send_message(transport, client, &response) {
            error!("handshake with client {} failed: {err}", client.0);
            self.disconnect(transport, players, client, DisconnectReason::Error(err.clone()))?;
            return Err(err);
        }

        info!("client {} connected, player entity {}", client.0, player.raw());
        Ok(client)
    }

    /// Removes a client, despawns its player and frees its id.
    ///
    /// The client's command queue, tick base and snapshot state are dropped
    /// with it. Clients dropped by the server are sent DISCONNECT first.
    pub fn disconnect<T, P>(
        &mut self,
        transport: &mut T,
        players: &mut P,
        client: ClientId,
        reason: DisconnectReason,
    ) -> SessionResult<DisconnectEvent>
    where
        T: Transport,
        P: PlayerFactory,
    {
        let connection = self
            .connections
            .remove(&client)
            .ok_or(SessionError::ClientNotFound { client })?;

        let notice = match &reason {
            DisconnectReason::ClientLeft { .. } => None,
            DisconnectReason::Kicked { reason } => Some(reason.clone()),
            DisconnectReason::Error(err) => Some(err.to_string()),
        };
        if let Some(reason) = notice {
            // The connection is going away either way.
            let _ = self.send_message(transport, client, &Disconnect { reason });
        }

        self.graph.remove_client(client);
        players.despawn_player(&mut self.graph, client, connection.player);
        self.free_ids.insert(client.0);

        info!("client {} disconnected: {reason:?}", client.0);
        Ok(DisconnectEvent {
            client,
            player: connection.player,
            reason,
        })
    }

    /// Handles one datagram from `client`.
    ///
    /// Per-connection errors end the connection and come back as a
    /// disconnect event, as does a DISCONNECT from the client. Datagrams
    /// from unknown clients, client messages that overtook HELLO and
    /// contained command errors are logged and dropped.
    pub fn handle_datagram<T, P>(
        &mut self,
        transport: &mut T,
        players: &mut P,
        client: ClientId,
        bytes: &[u8],
        now: f64,
    ) -> Option<DisconnectEvent>
    where
        T: Transport,
        P: PlayerFactory,
    {
        match self.dispatch(transport, players, client, bytes, now) {
            Ok(event) => event,
            Err(err @ SessionError::ClientNotFound { .. }) => {
                warn!("ignoring datagram: {err}");
                None
            }
            Err(err) if err.is_connection_fatal() => {
                error!("terminating client {}: {err}", client.0);
                self.disconnect(transport, players, client, DisconnectReason::Error(err))
                    .ok()
            }
            Err(err) => {
                warn!("client {}: {err}", client.0);
                None
            }
        }
    }

    fn dispatch<T, P>(
        &mut self,
        transport: &mut T,
        players: &mut P,
        client: ClientId,
        bytes: &[u8],
        now: f64,
    ) -> SessionResult<Option<DisconnectEvent>>
    where
        T: Transport,
        P: PlayerFactory,
    {
        let limits = self.config.wire_limits.clone();
        let connection = self
            .connections
            .get_mut(&client)
            .ok_or(SessionError::ClientNotFound { client })?;
        let message = wire::decode_message(bytes, &limits)?;
        debug!(
            "client {}: {} ({} bytes)",
            client.0,
            message.kind,
            bytes.len()
        );

        if !connection.greeted
            && matches!(
                message.kind,
                MessageType::ClientState
                    | MessageType::Tick
                    | MessageType::UserCmd
                    | MessageType::ClockSyncRequest
            )
        {
            return Err(SessionError::HandshakeIncomplete { kind: message.kind });
        }

        match message.kind {
            MessageType::Hello => {
                let hello: Hello = wire::decode_body(&message, &limits)?;
                let expected_hash = self.graph.schema().hash();
                if hello.protocol_version != self.config.protocol_version
                    || hello.schema_hash != expected_hash
                {
                    return Err(SessionError::SchemaVersionMismatch {
                        expected_version: self.config.protocol_version,
                        found_version: hello.protocol_version,
                        expected_hash,
                        found_hash: hello.schema_hash,
                    });
                }
                connection.greeted = true;
            }
            MessageType::ClientState => {
                let state: ClientState = wire::decode_body(&message, &limits)?;
                self.set_client_state(transport, client, state)?;
            }
            MessageType::Tick => {
                let ack: Tick = wire::decode_body(&message, &limits)?;
                connection.acked_tick = Some(ack.tick);
            }
            MessageType::UserCmd => {
                let batch = decode_usercmd_batch(&message, &self.config.commands)?;
                connection.commands.receive(self.tick, batch, self.paused)?;
            }
            MessageType::ClockSyncRequest => {
                let request: ClockSyncRequest = wire::decode_body(&message, &limits)?;
                let response = ClockSyncResponse {
                    context: request.context,
                    timestamp: self.network_time(now),
                };
                self.send_message(transport, client, &response)?;
            }
            MessageType::Disconnect => {
                let notice: Disconnect = wire::decode_body(&message, &limits)?;
                let event = self.disconnect(
                    transport,
                    players,
                    client,
                    DisconnectReason::ClientLeft {
                        reason: notice.reason,
                    },
                )?;
                return Ok(Some(event));
            }
            kind => return Err(SessionError::UnexpectedMessage { kind }),
        }
        Ok(None)
    }

    fn set_client_state<T: Transport>(
        &mut self,
        transport: &mut T,
        client: ClientId,
        state: ClientState,
    ) -> SessionResult<()> {
        let connection = self
            .connections
            .get_mut(&client)
            .ok_or(SessionError::ClientNotFound { client })?;
        let previous = connection.state;
        connection.state = state;

        match (previous, state) {
            (ClientState::None, ClientState::Playing) => {
                connection.tick_base.set(self.tick);
                self.graph.add_client(client);
                info!("client {} is playing", client.0);

                let tick = Tick {
                    tick: self.tick,
                    interval: self.config.interval_per_tick(),
                };
                self.send_message(transport, client, &tick)?;
                let snapshot_tick = SnapshotTick::new(self.tick as u32);
                match self.graph.build_snapshot(client, true, snapshot_tick) {
                    Ok(parts) => {
                        for part in &parts {
                            send_bytes(transport, client, &part.bytes)?;
                        }
                        self.graph.snapshot_sent(client, SnapshotMode::Full);
                    }
                    // The graph still owes this client a full snapshot.
                    Err(err) => warn!("full snapshot for client {} failed: {err}", client.0),
                }
            }
            (ClientState::Playing, ClientState::None) => {
                self.graph.remove_client(client);
                info!("client {} stopped playing", client.0);
            }
            _ => {}
        }
        Ok(())
    }

    /// Runs one server tick.
    pub fn run_tick<T, G>(&mut self, transport: &mut T, game: &mut G) -> TickReport
    where
        T: Transport,
        G: Simulation + PlayerFactory,
    {
        self.simulate_tick(transport, game, 1)
    }

    /// Runs `ticks` server ticks back to back, as after a long frame.
    ///
    /// Commands queued when the frame starts are spread over its ticks.
    pub fn run_frame<T, G>(&mut self, transport: &mut T, game: &mut G, ticks: usize) -> Vec<TickReport>
    where
        T: Transport,
        G: Simulation + PlayerFactory,
    {
        (0..ticks)
            .map(|done| self.simulate_tick(transport, game, ticks - done))
            .collect()
    }

    fn simulate_tick<T, G>(&mut self, transport: &mut T, game: &mut G, remaining: usize) -> TickReport
    where
        T: Transport,
        G: Simulation + PlayerFactory,
    {
        let interval = self.config.interval_per_tick();
        let playing = self.playing_clients();
        let single_client = playing.len() == 1;
        let mut commands_run = 0;

        for client in &playing {
            let Some(connection) = self.connections.get_mut(client) else {
                continue;
            };
            if connection.commands.is_empty() {
                continue;
            }
            let sim_ticks = connection.commands.determine_simulation_ticks();
            if sim_ticks > 0 {
                connection
                    .tick_base
                    .adjust(self.tick, sim_ticks, interval, single_client);
            }

            let commands = connection.commands.drain(remaining);
            for cmd in &commands {
                let player = PlayerContext {
                    client: *client,
                    entity: connection.player,
                    tick: connection.tick_base.get(),
                };
                if let Err(err) = game.run_command(&mut self.graph, player, cmd) {
                    warn!(
                        "command {} of client {} failed: {err}",
                        cmd.command_number, client.0
                    );
                }
                connection.tick_base.advance();
            }
            commands_run += commands.len();
        }

        if let Err(err) = game.simulate_world(&mut self.graph, self.tick) {
            warn!("world simulation failed at tick {}: {err}", self.tick);
        }

        self.tick = self.tick.wrapping_add(1);
        let mut report = TickReport {
            tick: self.tick,
            commands_run,
            max_ack_lag: self.max_ack_lag(),
            ..TickReport::default()
        };

        for (client, err) in self.emit_snapshots(transport, &mut report) {
            error!("terminating client {}: {err}", client.0);
            if let Ok(event) =
                self.disconnect(transport, game, client, DisconnectReason::Error(err))
            {
                report.disconnects.push(event);
            }
        }
        report
    }

    /// Sends TICK, pending deletes and one snapshot to every playing client,
    /// then resets dirtiness once. Returns the clients whose sends failed.
    fn emit_snapshots<T: Transport>(
        &mut self,
        transport: &mut T,
        report: &mut TickReport,
    ) -> Vec<(ClientId, SessionError)> {
        let limits = self.config.wire_limits.clone();
        let mut failed = Vec::new();
        let mut broadcast = Vec::new();

        let tick = Tick {
            tick: self.tick,
            interval: self.config.interval_per_tick(),
        };
        match wire::encode_message(&tick, &limits) {
            Ok(bytes) => broadcast.push(bytes),
            Err(err) => warn!("encoding TICK {}: {err}", self.tick),
        }
        for entity in self.graph.drain_removed() {
            let delete = EntityDelete {
                entity_id: entity.raw(),
            };
            match wire::encode_message(&delete, &limits) {
                Ok(bytes) => broadcast.push(bytes),
                Err(err) => warn!("encoding ENTITY_DELETE {}: {err}", entity.raw()),
            }
        }

        let snapshot_tick = SnapshotTick::new(self.tick as u32);
        'clients: for client in self.playing_clients() {
            for bytes in &broadcast {
                if let Err(err) = send_bytes(transport, client, bytes) {
                    failed.push((client, err));
                    continue 'clients;
                }
            }

            let parts = match self.graph.build_snapshot(client, false, snapshot_tick) {
                Ok(parts) => parts,
                Err(err) => {
                    // This tick's changes are about to be cleared.
                    warn!("snapshot for client {} failed, resending full: {err}", client.0);
                    self.graph.request_full(client);
                    continue;
                }
            };
            let Some(mode) = parts.first().map(|part| part.mode) else {
                continue;
            };
            for part in &parts {
                if let Err(err) = send_bytes(transport, client, &part.bytes) {
                    failed.push((client, err));
                    continue 'clients;
                }
                report.snapshots_sent += 1;
                report.snapshot_bytes += part.bytes.len();
            }
            self.graph.snapshot_sent(client, mode);
        }

        self.graph.clear_changes();
        failed
    }

    fn max_ack_lag(&self) -> Option<i32> {
        self.connections
            .values()
            .filter(|conn| conn.state == ClientState::Playing)
            .filter_map(|conn| conn.acked_tick)
            .map(|acked| self.tick.wrapping_sub(acked))
            .max()
    }

    fn playing_clients(&self) -> Vec<ClientId> {
        self.connections
            .iter()
            .filter(|(_, conn)| conn.state == ClientState::Playing)
            .map(|(client, _)| *client)
            .collect()
    }

    fn allocate_id(&mut self) -> SessionResult<ClientId> {
        let limit = self.config.max_clients;
        if self.connections.len() >= limit {
            return Err(SessionError::TooManyClients { limit });
        }
        if let Some(id) = self.free_ids.pop_first() {
            return Ok(ClientId(id));
        }
        let id = u16::try_from(self.next_id).map_err(|_| SessionError::TooManyClients { limit })?;
        self.next_id += 1;
        Ok(ClientId(id))
    }

    fn send_message<T, M>(&self, transport: &mut T, client: ClientId, message: &M) -> SessionResult<()>
    where
        T: Transport,
        M: wire::Message,
    {
        let bytes = wire::encode_message(message, &self.config.wire_limits)?;
        send_bytes(transport, client, &bytes)
    }
}

fn send_bytes<T: Transport>(transport: &mut T, client: ClientId, bytes: &[u8]) -> SessionResult<()> {
    transport
        .send(client, bytes)
        .map_err(|source| SessionError::Transport { client, source })
}
