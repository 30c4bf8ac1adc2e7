use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use clock::sign_extend16;
use codec::EntityId;
use command::UserCmd;
use demo_schema::{demo_schema, DemoClasses, MAX_HEALTH, MAX_SPEED};
use env_logger::Env;
use log::{info, warn};
use repgraph::{ClientId, GraphResult, ReplicationGraph};
use schema::{FieldValue, Schema};
use serde::Serialize;
use session::{
    ClientConfig, ClientEvent, ClientSession, MemoryTransport, PlayerContext, PlayerFactory,
    ServerConfig, ServerContext, Simulation,
};
use tools::decode_datagram_json;
use wire::ClientState;

const ATTACK: u32 = 1;
const PROJECTILE_SPEED: f32 = 900.0;
const PROJECTILE_TICKS: i32 = 40;
const CLOCK_SYNC_EVERY: u32 = 200;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic loopback simulation and capture generator"
)]
struct Cli {
    /// Number of connected clients.
    #[arg(long, default_value_t = 4)]
    clients: u16,
    /// Number of server ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Fraction of USERCMD datagrams lost on the way to the server.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,
    /// Send commands only every Nth tick; the rest are choked.
    #[arg(long)]
    send_every: Option<u32>,
    /// Output directory for the first client's captured datagrams.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Fail if the average snapshot exceeds this many bytes.
    #[arg(long)]
    max_avg_snapshot_bytes: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if !(0.0..1.0).contains(&cli.loss) {
        bail!("--loss must be in [0, 1), got {}", cli.loss);
    }

    let (schema, classes) = demo_schema().context("build demo schema")?;
    let schema = Arc::new(schema);
    let config = ServerConfig {
        world_name: String::from("demo"),
        ..ServerConfig::default()
    };
    let interval = f64::from(config.interval_per_tick());
    let mut server = ServerContext::new(config, Arc::clone(&schema)).context("create server")?;
    let mut transport = MemoryTransport::new();
    let mut game = DemoGame::new(classes, interval as f32);
    let mut rng = Rng::new(cli.seed);

    let mut capture = cli
        .out_dir
        .as_deref()
        .map(|dir| Capture::create(dir, &schema))
        .transpose()?;
    let mut summary = Summary::new(&cli);

    let mut clients = Vec::with_capacity(usize::from(cli.clients));
    for _ in 0..cli.clients {
        clients.push(join(&mut server, &mut transport, &mut game, &schema)?);
    }

    for tick in 1..=cli.ticks {
        let now = f64::from(tick) * interval;
        game.network_time = sign_extend16(server.network_time(now));

        for (id, client) in &mut clients {
            if let Some(ack) = client.tick_ack()? {
                server.handle_datagram(&mut transport, &mut game, *id, &ack, now);
            }
            if tick % CLOCK_SYNC_EVERY == 1 {
                if let Some(request) = client.request_clock_sync(now, "timer")? {
                    server.handle_datagram(&mut transport, &mut game, *id, &request, now);
                }
            }

            let send = cli.send_every.map_or(true, |every| tick % every.max(1) == 0);
            summary.commands_created += 1;
            let Some(batch) = client.create_command(rng.input(tick), send)? else {
                continue;
            };
            if rng.chance(cli.loss) {
                summary.usercmd_dropped += 1;
                continue;
            }
            summary.usercmd_sent += 1;
            if let Some(event) = server.handle_datagram(&mut transport, &mut game, *id, &batch, now)
            {
                warn!("client {} left: {:?}", event.client.0, event.reason);
            }
        }

        let report = server.run_tick(&mut transport, &mut game);
        summary.commands_run += report.commands_run as u64;
        summary.max_ack_lag = summary.max_ack_lag.max(report.max_ack_lag);
        for event in &report.disconnects {
            warn!("client {} dropped: {:?}", event.client.0, event.reason);
        }

        for (index, (id, client)) in clients.iter_mut().enumerate() {
            for bytes in transport.drain(*id) {
                if index == 0 {
                    if let Some(capture) = capture.as_mut() {
                        capture.write(tick, &bytes, &schema)?;
                    }
                }
                match client.handle_datagram(&bytes, now) {
                    Ok(ClientEvent::Snapshot(update)) => {
                        summary.push_snapshot(bytes.len() as u64);
                        if update.skipped > 0 {
                            warn!("snapshot {} skipped {} records", update.tick.raw(), update.skipped);
                        }
                    }
                    Ok(ClientEvent::EntityDeleted(_)) => summary.deletes += 1,
                    Ok(ClientEvent::ClockSync {
                        outcome,
                        resend: Some(request),
                    }) => {
                        info!("client {} clock sync: {outcome:?}", id.0);
                        server.handle_datagram(&mut transport, &mut game, *id, &request, now);
                    }
                    Ok(_) => {}
                    Err(err) => warn!("client {} failed to handle datagram: {err}", id.0),
                }
            }
        }
    }

    summary.clock_synced = clients
        .iter()
        .filter(|(_, client)| client.clock().is_synchronized())
        .count();
    summary.converged = clients
        .iter()
        .all(|(_, client)| mirror_matches(server.graph(), client));
    summary.finalize();
    info!(
        "{} commands run of {} created, {} snapshots averaging {} bytes",
        summary.commands_run,
        summary.commands_created,
        summary.snapshot_count,
        summary.avg_snapshot_bytes
    );

    if let Some(dir) = &cli.out_dir {
        write_json(&dir.join("summary.json"), &summary)?;
    }
    if !summary.converged {
        bail!("client mirrors diverged from the server");
    }
    summary.assert_budget(cli.max_avg_snapshot_bytes)?;
    Ok(())
}

/// Connects one client over a lossless handshake.
fn join(
    server: &mut ServerContext,
    transport: &mut MemoryTransport,
    game: &mut DemoGame,
    schema: &Arc<Schema>,
) -> Result<(ClientId, ClientSession)> {
    let mut client = ClientSession::new(ClientConfig::default(), Arc::clone(schema))?;
    let id = server.connect(transport, game)?;
    for bytes in transport.drain(id) {
        client.handle_datagram(&bytes, 0.0)?;
    }
    for bytes in [client.hello()?, client.client_state(ClientState::Playing)?] {
        if let Some(event) = server.handle_datagram(transport, game, id, &bytes, 0.0) {
            bail!("client {} rejected: {:?}", id.0, event.reason);
        }
    }
    for bytes in transport.drain(id) {
        client.handle_datagram(&bytes, 0.0)?;
    }
    Ok((id, client))
}

fn mirror_matches(graph: &ReplicationGraph, client: &ClientSession) -> bool {
    if client.entities().count() != graph.len() {
        return false;
    }
    graph.iter().all(|(entity, object)| {
        client
            .entity(entity)
            .is_some_and(|mirror| mirror.class() == object.class() && mirror.values() == object.values())
    })
}

struct Projectile {
    entity: EntityId,
    expires: i32,
}

/// Moves players by their input and fires projectiles on attack.
struct DemoGame {
    classes: DemoClasses,
    projectiles: Vec<Projectile>,
    /// Seconds per tick.
    dt: f32,
    /// 16-bit network time of the current tick.
    network_time: i32,
}

impl DemoGame {
    fn new(classes: DemoClasses, dt: f32) -> Self {
        Self {
            classes,
            projectiles: Vec::new(),
            dt,
            network_time: 0,
        }
    }

    fn advance(origin: &mut [f32; 3], velocity: [f32; 3], dt: f32) {
        for (position, speed) in origin.iter_mut().zip(velocity) {
            *position += speed * dt;
        }
    }

    fn vec3(graph: &ReplicationGraph, entity: EntityId, field: schema::FieldId) -> [f32; 3] {
        match graph.get(entity).and_then(|object| object.value(field)) {
            Some(FieldValue::Vec3(value)) => *value,
            _ => [0.0; 3],
        }
    }
}

impl PlayerFactory for DemoGame {
    fn spawn_player(
        &mut self,
        graph: &mut ReplicationGraph,
        client: ClientId,
    ) -> GraphResult<EntityId> {
        let fields = self.classes.player;
        let entity = graph.spawn(fields.class)?;
        graph.set(entity, fields.health, FieldValue::Int(MAX_HEALTH))?;
        graph.set(entity, fields.name, FieldValue::String(format!("player{}", client.0)))?;
        graph.set(entity, fields.spawn_time, FieldValue::Timestamp(self.network_time))?;
        Ok(entity)
    }
}

impl Simulation for DemoGame {
    fn run_command(
        &mut self,
        graph: &mut ReplicationGraph,
        player: PlayerContext,
        cmd: &UserCmd,
    ) -> GraphResult<()> {
        let fields = self.classes.player;
        let velocity = [
            cmd.forward_move.clamp(-1.0, 1.0) * MAX_SPEED,
            cmd.side_move.clamp(-1.0, 1.0) * MAX_SPEED,
            0.0,
        ];
        let mut origin = Self::vec3(graph, player.entity, fields.origin);
        Self::advance(&mut origin, velocity, self.dt);
        graph.set(player.entity, fields.origin, FieldValue::Vec3(origin))?;
        graph.set(player.entity, fields.velocity, FieldValue::Vec3(velocity))?;
        graph.set(player.entity, fields.view_angles, FieldValue::Vec3(cmd.view_angles))?;
        graph.set(player.entity, fields.buttons, FieldValue::UInt(u64::from(cmd.buttons)))?;

        if cmd.buttons & ATTACK != 0 {
            let shot = self.classes.projectile;
            let yaw = cmd.view_angles[1].to_radians();
            let entity = graph.spawn(shot.class)?;
            graph.set(entity, shot.origin, FieldValue::Vec3(origin))?;
            graph.set(
                entity,
                shot.velocity,
                FieldValue::Vec3([yaw.cos() * PROJECTILE_SPEED, yaw.sin() * PROJECTILE_SPEED, 0.0]),
            )?;
            graph.set(entity, shot.owner, FieldValue::UInt(u64::from(player.entity.raw())))?;
            graph.set(
                entity,
                shot.expires,
                FieldValue::Timestamp(sign_extend16(self.network_time + PROJECTILE_TICKS)),
            )?;
            self.projectiles.push(Projectile {
                entity,
                expires: player.tick + PROJECTILE_TICKS,
            });
        }
        Ok(())
    }

    fn simulate_world(&mut self, graph: &mut ReplicationGraph, tick: i32) -> GraphResult<()> {
        let shot = self.classes.projectile;
        let mut alive = Vec::with_capacity(self.projectiles.len());
        for projectile in self.projectiles.drain(..) {
            if projectile.expires <= tick {
                graph.remove(projectile.entity)?;
                continue;
            }
            let velocity = Self::vec3(graph, projectile.entity, shot.velocity);
            let mut origin = Self::vec3(graph, projectile.entity, shot.origin);
            Self::advance(&mut origin, velocity, self.dt);
            graph.set(projectile.entity, shot.origin, FieldValue::Vec3(origin))?;
            alive.push(projectile);
        }
        self.projectiles = alive;
        Ok(())
    }
}

/// Writes every datagram the first client receives.
struct Capture {
    dir: PathBuf,
    seq: u32,
}

impl Capture {
    fn create(dir: &Path, schema: &Schema) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
        write_json(&dir.join("schema.json"), schema)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            seq: 0,
        })
    }

    fn write(&mut self, tick: u32, bytes: &[u8], schema: &Schema) -> Result<()> {
        // Every captured datagram must decode with the shipped tools.
        let decoded = decode_datagram_json(
            bytes,
            schema,
            &wire::Limits::default(),
            &codec::CodecLimits::default(),
        )
        .context("tools decode")?;
        let kind = decoded["kind"].as_str().unwrap_or("UNKNOWN").to_lowercase();
        let path = self
            .dir
            .join(format!("{tick:06}_{:04}_{kind}.bin", self.seq));
        self.seq += 1;
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Deterministic LCG so runs with the same seed are identical.
struct Rng {
    state: u64,
}

impl Rng {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn unit(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.unit() < probability
    }

    fn input(&mut self, tick: u32) -> UserCmd {
        UserCmd {
            tick_count: tick,
            view_angles: [0.0, (self.next_u32() % 360) as f32, 0.0],
            forward_move: (self.unit() * 2.0 - 1.0) as f32,
            side_move: (self.unit() * 2.0 - 1.0) as f32,
            buttons: u32::from(self.next_u32() % 25 == 0) * ATTACK,
            ..UserCmd::NULL
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    clients: u16,
    ticks: u32,
    seed: u64,
    loss: f64,
    commands_created: u64,
    usercmd_sent: u64,
    usercmd_dropped: u64,
    commands_run: u64,
    snapshot_count: u64,
    snapshot_bytes_total: u64,
    avg_snapshot_bytes: u64,
    p95_snapshot_bytes: u64,
    deletes: u64,
    max_ack_lag: Option<i32>,
    clock_synced: usize,
    converged: bool,
    #[serde(skip)]
    snapshot_sizes: Vec<u64>,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            clients: cli.clients,
            ticks: cli.ticks,
            seed: cli.seed,
            loss: cli.loss,
            commands_created: 0,
            usercmd_sent: 0,
            usercmd_dropped: 0,
            commands_run: 0,
            snapshot_count: 0,
            snapshot_bytes_total: 0,
            avg_snapshot_bytes: 0,
            p95_snapshot_bytes: 0,
            deletes: 0,
            max_ack_lag: None,
            clock_synced: 0,
            converged: false,
            snapshot_sizes: Vec::new(),
        }
    }

    fn push_snapshot(&mut self, bytes: u64) {
        self.snapshot_count += 1;
        self.snapshot_bytes_total += bytes;
        self.snapshot_sizes.push(bytes);
    }

    fn finalize(&mut self) {
        if self.snapshot_sizes.is_empty() {
            return;
        }
        self.avg_snapshot_bytes = self.snapshot_bytes_total / self.snapshot_count;
        self.snapshot_sizes.sort_unstable();
        let idx = ((self.snapshot_sizes.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(self.snapshot_sizes.len() - 1);
        self.p95_snapshot_bytes = self.snapshot_sizes[idx];
    }

    fn assert_budget(&self, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_avg) = max_avg {
            if self.avg_snapshot_bytes > max_avg {
                bail!(
                    "avg snapshot bytes {} exceeds budget {max_avg}",
                    self.avg_snapshot_bytes
                );
            }
        }
        Ok(())
    }
}
