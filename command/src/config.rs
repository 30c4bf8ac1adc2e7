//! Command queue and tick base configuration.

/// Limits and policy for command batches, on both ends of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Drops at or above this count skip gap fill for the batch.
    pub max_dropped_for_gap_fill: u32,
    /// Largest accepted `backup + new`; 63 or more is always rejected.
    pub max_batch_commands: usize,
    /// Queued contexts per client before the oldest is discarded.
    pub max_contexts: usize,
    /// Commands run per server tick when several ticks run in one frame.
    pub command_limit_per_tick: usize,
    /// Client side: backup commands repeated in every batch.
    pub client_backup_commands: usize,
    /// Client side: cap on new commands per batch.
    pub client_max_new_commands: usize,
    /// Client side: ring of outgoing commands.
    pub client_command_ring: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_dropped_for_gap_fill: 24,
            max_batch_commands: 62,
            max_contexts: 1000,
            command_limit_per_tick: 1,
            client_backup_commands: 2,
            client_max_new_commands: 15,
            client_command_ring: 90,
        }
    }
}

impl CommandConfig {
    /// Configuration for servers that simulate every other tick in pairs.
    #[must_use]
    pub fn with_alternate_ticks() -> Self {
        Self {
            command_limit_per_tick: 2,
            ..Self::default()
        }
    }

    /// Smaller queues for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_contexts: 8,
            client_command_ring: 16,
            ..Self::default()
        }
    }
}

/// Deadband for tick base correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickBaseConfig {
    /// Allowed client clock drift in milliseconds, clamped to `[0, 1000]`.
    pub clock_correction_msecs: f32,
}

impl Default for TickBaseConfig {
    fn default() -> Self {
        Self {
            clock_correction_msecs: 60.0,
        }
    }
}

impl TickBaseConfig {
    /// The deadband half-width in ticks for a tick interval in seconds.
    #[must_use]
    pub fn correction_ticks(&self, interval_per_tick: f32) -> i32 {
        let seconds = (self.clock_correction_msecs / 1000.0).clamp(0.0, 1.0);
        time_to_ticks(seconds, interval_per_tick)
    }
}

/// Rounds a duration to the nearest whole tick.
#[must_use]
pub fn time_to_ticks(seconds: f32, interval_per_tick: f32) -> i32 {
    if interval_per_tick <= 0.0 {
        return 0;
    }
    (0.5 + seconds / interval_per_tick).floor() as i32
}
