//! Server-side command queue with gap fill and roll-over.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::batch::UserCmdBatch;
use crate::config::CommandConfig;
use crate::error::{CommandError, CommandResult};
use crate::usercmd::UserCmd;

/// One received batch, newest command first.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
    commands: Vec<UserCmd>,
    new_count: usize,
    dropped: u32,
    paused: bool,
}

impl CommandContext {
    /// All commands of the batch, newest first.
    #[must_use]
    pub fn commands(&self) -> &[UserCmd] {
        &self.commands
    }

    #[must_use]
    pub const fn new_count(&self) -> usize {
        self.new_count
    }

    #[must_use]
    pub fn backup_count(&self) -> usize {
        self.commands.len() - self.new_count
    }

    /// Commands lost between the previous batch and this one.
    #[must_use]
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    #[must_use]
    pub const fn paused(&self) -> bool {
        self.paused
    }
}

/// Per-client queue of received command batches.
///
/// Batches are queued by [`receive`](Self::receive) as they arrive and turned
/// into an ordered run list by [`drain`](Self::drain) once per server tick.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    config: CommandConfig,
    contexts: VecDeque<CommandContext>,
    last_received: Option<u32>,
    last_batch_tick: Option<i32>,
    last_cmd: UserCmd,
    view_angles: [f32; 3],
}

impl CommandQueue {
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        Self {
            config,
            contexts: VecDeque::new(),
            last_received: None,
            last_batch_tick: None,
            last_cmd: UserCmd::NULL,
            view_angles: [0.0; 3],
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Number of queued contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn contexts(&self) -> impl Iterator<Item = &CommandContext> {
        self.contexts.iter()
    }

    /// Highest command number received so far.
    #[must_use]
    pub const fn last_received(&self) -> Option<u32> {
        self.last_received
    }

    /// The most recently gathered command; replayed with an incremented tick
    /// count when gap fill runs out of backups.
    #[must_use]
    pub const fn last_command(&self) -> &UserCmd {
        &self.last_cmd
    }

    /// Queues a decoded batch received during `server_tick`.
    ///
    /// Only one batch is accepted per server tick. Batches whose newest
    /// command was already received are discarded, and new commands that
    /// were already received are demoted to backups. The number of commands
    /// lost since the previous batch is derived from the command numbers.
    pub fn receive(
        &mut self,
        server_tick: i32,
        batch: UserCmdBatch,
        paused: bool,
    ) -> CommandResult<()> {
        if self.last_batch_tick == Some(server_tick) {
            return Err(CommandError::DuplicateBatch { tick: server_tick });
        }
        let new_count = batch.new_count();
        let Some(newest) = batch.newest().map(|cmd| cmd.command_number) else {
            return Err(CommandError::NoNewCommands);
        };
        if new_count == 0 {
            return Err(CommandError::NoNewCommands);
        }
        if let Some(last_received) = self.last_received {
            if newest <= last_received {
                return Err(CommandError::StaleBatch {
                    newest,
                    last_received,
                });
            }
        }
        self.last_batch_tick = Some(server_tick);

        let mut commands = batch.commands;
        commands.reverse();

        let (fresh, mut dropped) = match self.last_received {
            Some(last) => {
                let fresh = new_count.min((newest - last) as usize);
                let oldest_new = commands[fresh - 1].command_number;
                (fresh, oldest_new.saturating_sub(last).saturating_sub(1))
            }
            None => (new_count, 0),
        };
        self.last_received = Some(newest);

        if paused {
            for cmd in &mut commands[..fresh] {
                *cmd = cmd.neutralized(self.view_angles);
            }
            dropped = 0;
        }

        if self.contexts.len() >= self.config.max_contexts {
            self.contexts.pop_front();
            warn!(
                "{}",
                CommandError::TooManyContexts {
                    limit: self.config.max_contexts
                }
            );
        }

        debug!("queued {fresh} new commands up to {newest}, {dropped} dropped");
        self.contexts.push_back(CommandContext {
            commands,
            new_count: fresh,
            dropped,
            paused,
        });
        Ok(())
    }

    /// Ticks the queued commands will simulate: new plus dropped commands
    /// across all contexts.
    #[must_use]
    pub fn determine_simulation_ticks(&self) -> usize {
        self.contexts
            .iter()
            .map(|ctx| ctx.new_count + ctx.dropped as usize)
            .sum()
    }

    /// Builds the ordered list of commands to run this tick.
    ///
    /// Lost commands are reconstructed from backups, oldest first, or by
    /// replaying the last command when backups run short. When more commands
    /// are available than the per-tick limit allows and several ticks run
    /// this frame, the newest `sim_ticks_this_frame - 1` commands are kept
    /// queued for the following ticks.
    pub fn drain(&mut self, sim_ticks_this_frame: usize) -> Vec<UserCmd> {
        let mut available = self.gather();

        let limit = self.config.command_limit_per_tick;
        let paused = self.contexts.back().is_some_and(|ctx| ctx.paused);
        self.contexts.clear();

        if sim_ticks_this_frame >= limit && available.len() > limit {
            let roll = available
                .len()
                .min(sim_ticks_this_frame.saturating_sub(1));
            if roll > 0 {
                let mut rolled = available.split_off(available.len() - roll);
                rolled.reverse();
                self.contexts.push_back(CommandContext {
                    commands: rolled,
                    new_count: roll,
                    dropped: 0,
                    paused,
                });
            }
        }

        if let Some(last) = available.last() {
            self.view_angles = last.view_angles;
        }
        available
    }

    fn gather(&mut self) -> Vec<UserCmd> {
        let mut available = Vec::new();
        for ctx in &self.contexts {
            let backups = ctx.backup_count();
            let mut dropped = ctx.dropped as usize;

            if ctx.dropped >= self.config.max_dropped_for_gap_fill {
                warn!(
                    "{}",
                    CommandError::ExcessiveDroppedPackets {
                        dropped: ctx.dropped,
                        limit: self.config.max_dropped_for_gap_fill,
                    }
                );
            } else {
                while dropped > backups {
                    self.last_cmd.tick_count = self.last_cmd.tick_count.wrapping_add(1);
                    available.push(self.last_cmd);
                    dropped -= 1;
                }
                while dropped > 0 {
                    available.push(ctx.commands[ctx.new_count + dropped - 1]);
                    dropped -= 1;
                }
            }

            available.extend(ctx.commands[..ctx.new_count].iter().rev());
            if let Some(newest) = ctx.commands.first() {
                self.last_cmd = *newest;
            }
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(n: u32) -> UserCmd {
        UserCmd {
            command_number: n,
            tick_count: 1000 + n,
            buttons: n,
            forward_move: 1.0,
            ..UserCmd::NULL
        }
    }

    /// A batch with `backups` commands before `newest - new + 1 ..= newest`.
    fn batch(newest: u32, new: usize, backups: usize) -> UserCmdBatch {
        let first = newest + 1 - (new + backups) as u32;
        UserCmdBatch::new(backups, (first..=newest).map(cmd).collect())
    }

    fn numbers(cmds: &[UserCmd]) -> Vec<u32> {
        cmds.iter().map(|c| c.command_number).collect()
    }

    #[test]
    fn first_batch_runs_new_commands_only() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(3, 1, 2), false).unwrap();
        assert_eq!(queue.determine_simulation_ticks(), 1);
        assert_eq!(numbers(&queue.drain(1)), vec![3]);
        assert!(queue.is_empty());
        assert_eq!(queue.last_command().command_number, 3);
    }

    #[test]
    fn consecutive_batches_need_no_fill() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(1, 1, 0), false).unwrap();
        queue.drain(1);
        queue.receive(2, batch(3, 2, 2), false).unwrap();
        assert_eq!(queue.contexts().next().unwrap().dropped(), 0);
        assert_eq!(numbers(&queue.drain(1)), vec![2, 3]);
    }

    #[test]
    fn one_lost_packet_is_filled_from_backups() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(10, 1, 2), false).unwrap();
        queue.drain(1);
        // Command 11 was lost.
        queue.receive(2, batch(12, 1, 2), false).unwrap();
        assert_eq!(queue.determine_simulation_ticks(), 2);
        assert_eq!(numbers(&queue.drain(1)), vec![11, 12]);
    }

    #[test]
    fn replay_when_backups_run_short() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(10, 1, 2), false).unwrap();
        queue.drain(1);
        queue.receive(2, batch(14, 1, 2), false).unwrap();
        assert_eq!(queue.contexts().next().unwrap().dropped(), 3);

        let run = queue.drain(1);
        assert_eq!(numbers(&run), vec![10, 12, 13, 14]);
        assert_eq!(run[0].tick_count, cmd(10).tick_count + 1);
        assert_eq!(run[0].buttons, cmd(10).buttons);
    }

    #[test]
    fn excessive_drops_skip_gap_fill() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(1, 1, 0), false).unwrap();
        queue.drain(1);
        queue.receive(2, batch(40, 1, 2), false).unwrap();
        assert_eq!(queue.contexts().next().unwrap().dropped(), 38);
        assert_eq!(numbers(&queue.drain(1)), vec![40]);
    }

    #[test]
    fn duplicate_tick_rejected() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(5, batch(1, 1, 0), false).unwrap();
        assert_eq!(
            queue.receive(5, batch(2, 1, 0), false),
            Err(CommandError::DuplicateBatch { tick: 5 })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn stale_batch_rejected() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(5, 1, 0), false).unwrap();
        assert_eq!(
            queue.receive(2, batch(5, 1, 2), false),
            Err(CommandError::StaleBatch {
                newest: 5,
                last_received: 5
            })
        );
    }

    #[test]
    fn already_received_new_commands_are_trimmed() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(5, 1, 0), false).unwrap();
        queue.drain(1);
        // 4 and 5 arrive again as new alongside 6.
        queue.receive(2, batch(6, 3, 0), false).unwrap();
        let ctx = queue.contexts().next().unwrap();
        assert_eq!(ctx.new_count(), 1);
        assert_eq!(ctx.dropped(), 0);
        assert_eq!(numbers(&queue.drain(1)), vec![6]);
    }

    #[test]
    fn paused_commands_are_neutralized() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(1, 1, 0), false).unwrap();
        queue.drain(1);
        queue.receive(2, batch(6, 1, 2), true).unwrap();
        let ctx = queue.contexts().next().unwrap();
        assert!(ctx.paused());
        assert_eq!(ctx.dropped(), 0);
        let run = queue.drain(1);
        assert_eq!(numbers(&run), vec![6]);
        assert_eq!(run[0].buttons, 0);
        assert_eq!(run[0].forward_move, 0.0);
    }

    #[test]
    fn roll_over_keeps_newest_commands() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(5, 5, 0), false).unwrap();
        let run = queue.drain(3);
        assert_eq!(numbers(&run), vec![1, 2, 3]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.determine_simulation_ticks(), 2);
        assert_eq!(numbers(&queue.drain(1)), vec![4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn single_tick_frame_runs_everything() {
        let mut queue = CommandQueue::new(CommandConfig::default());
        queue.receive(1, batch(4, 4, 0), false).unwrap();
        assert_eq!(numbers(&queue.drain(1)), vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn context_cap_discards_oldest() {
        let config = CommandConfig::for_testing();
        let cap = config.max_contexts;
        let mut queue = CommandQueue::new(config);
        for tick in 0..=cap as i32 {
            let newest = tick as u32 + 1;
            queue.receive(tick, batch(newest, 1, 0), false).unwrap();
        }
        assert_eq!(queue.len(), cap);
        assert_eq!(queue.contexts().next().unwrap().commands()[0].command_number, 2);
    }
}
