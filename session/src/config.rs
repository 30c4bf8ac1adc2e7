use clock::{ClockConfig, TimeSyncConfig};
use codec::CodecLimits;
use command::{CommandConfig, TickBaseConfig};
use repgraph::ReplicationConfig;

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_rate: u8,
    pub protocol_version: u16,
    pub world_name: String,
    /// Concurrent clients; ids run from 1 to 0xFFFF.
    pub max_clients: usize,
    pub replication: ReplicationConfig,
    pub commands: CommandConfig,
    pub tick_base: TickBaseConfig,
    pub clock: ClockConfig,
    pub wire_limits: wire::Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 66,
            protocol_version: wire::PROTOCOL_VERSION,
            world_name: String::from("default"),
            max_clients: 0xFFFF,
            replication: ReplicationConfig::default(),
            commands: CommandConfig::default(),
            tick_base: TickBaseConfig::default(),
            clock: ClockConfig::default(),
            wire_limits: wire::Limits::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            tick_rate: 20,
            world_name: String::from("test"),
            max_clients: 8,
            replication: ReplicationConfig::for_testing(),
            commands: CommandConfig::for_testing(),
            wire_limits: wire::Limits::for_testing(),
            ..Self::default()
        }
    }

    /// Seconds per tick.
    #[must_use]
    pub fn interval_per_tick(&self) -> f32 {
        1.0 / f32::from(self.tick_rate.max(1))
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub protocol_version: u16,
    pub codec_limits: CodecLimits,
    pub wire_limits: wire::Limits,
    pub commands: CommandConfig,
    pub clock: ClockConfig,
    pub time_sync: TimeSyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: wire::PROTOCOL_VERSION,
            codec_limits: CodecLimits::default(),
            wire_limits: wire::Limits::default(),
            commands: CommandConfig::default(),
            clock: ClockConfig::default(),
            time_sync: TimeSyncConfig::default(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            codec_limits: CodecLimits::for_testing(),
            wire_limits: wire::Limits::for_testing(),
            commands: CommandConfig::for_testing(),
            ..Self::default()
        }
    }
}
