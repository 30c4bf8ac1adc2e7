//! Per-player tick base correction.

use log::debug;

use crate::config::TickBaseConfig;

/// The tick a player's commands are simulated at.
///
/// The tick base advances once per executed command. When the client's
/// clock drifts outside the configured deadband around the server tick the
/// tick base snaps back so the next batch lands at the ideal tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickBase {
    tick_base: i32,
    config: TickBaseConfig,
}

impl TickBase {
    #[must_use]
    pub const fn new(config: TickBaseConfig) -> Self {
        Self {
            tick_base: 0,
            config,
        }
    }

    #[must_use]
    pub const fn get(&self) -> i32 {
        self.tick_base
    }

    pub fn set(&mut self, tick: i32) {
        self.tick_base = tick;
    }

    /// Called once for every command executed.
    pub fn advance(&mut self) {
        self.tick_base = self.tick_base.wrapping_add(1);
    }

    /// Re-anchors the tick base before `sim_ticks` commands run.
    ///
    /// Returns `true` when the tick base was changed.
    pub fn adjust(
        &mut self,
        server_tick: i32,
        sim_ticks: usize,
        interval_per_tick: f32,
        single_client: bool,
    ) -> bool {
        let sim_ticks = i32::try_from(sim_ticks).unwrap_or(i32::MAX);

        if single_client {
            let target = server_tick.saturating_sub(sim_ticks);
            let changed = target != self.tick_base;
            self.tick_base = target;
            return changed;
        }

        let correction = self.config.correction_ticks(interval_per_tick);
        let ideal = server_tick.saturating_add(correction);
        let estimated = self.tick_base.saturating_add(sim_ticks);
        let low = ideal.saturating_sub(correction);
        let high = ideal.saturating_add(correction);

        if (low..=high).contains(&estimated) {
            return false;
        }

        let target = ideal.saturating_sub(sim_ticks);
        debug!(
            "tick base {} outside [{low}, {high}], snapped to {target}",
            self.tick_base
        );
        self.tick_base = target;
        true
    }
}
