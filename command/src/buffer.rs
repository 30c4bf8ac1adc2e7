//! Client-side outgoing command ring.

use crate::batch::UserCmdBatch;
use crate::config::CommandConfig;
use crate::usercmd::UserCmd;

/// Outgoing commands on the client.
///
/// Each client tick writes one command with [`push`](Self::push) and then
/// either sends it with [`take_batch`](Self::take_batch) or holds it back
/// with [`choke`](Self::choke). Every batch repeats the last few sent
/// commands as backups so the server can recover from lost packets.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    ring: Vec<Option<UserCmd>>,
    last_outgoing: u32,
    choked: u32,
    backup_commands: usize,
    max_new_commands: usize,
}

impl CommandBuffer {
    #[must_use]
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            ring: vec![None; config.client_command_ring.max(1)],
            last_outgoing: 0,
            choked: 0,
            backup_commands: config.client_backup_commands,
            max_new_commands: config.client_max_new_commands.max(1),
        }
    }

    /// Number the next pushed command receives. The first is 1.
    #[must_use]
    pub const fn next_command_number(&self) -> u32 {
        self.last_outgoing
            .wrapping_add(self.choked)
            .wrapping_add(1)
    }

    #[must_use]
    pub const fn last_outgoing(&self) -> u32 {
        self.last_outgoing
    }

    #[must_use]
    pub const fn choked(&self) -> u32 {
        self.choked
    }

    /// Stores `cmd` as the pending command and returns its number.
    pub fn push(&mut self, mut cmd: UserCmd) -> u32 {
        let number = self.next_command_number();
        cmd.command_number = number;
        let slot = self.slot(number);
        self.ring[slot] = Some(cmd);
        number
    }

    /// The stored command with the given number, if still in the ring.
    #[must_use]
    pub fn get(&self, number: u32) -> Option<&UserCmd> {
        self.ring[self.slot(number)]
            .as_ref()
            .filter(|cmd| cmd.command_number == number)
    }

    /// Holds the pending command back for a later batch.
    pub fn choke(&mut self) {
        self.choked = self.choked.saturating_add(1);
    }

    /// Builds the batch that sends the pending command and everything choked
    /// before it.
    ///
    /// Commands no longer in the ring, and numbers before the first command,
    /// are sent as [`UserCmd::NULL`].
    pub fn take_batch(&mut self) -> UserCmdBatch {
        let newest = self.next_command_number();
        let new_count = (1 + self.choked as usize).min(self.max_new_commands);
        let total = new_count + self.backup_commands;

        let first = i64::from(newest) - total as i64 + 1;
        let commands = (first..=i64::from(newest))
            .map(|number| {
                u32::try_from(number)
                    .ok()
                    .filter(|&n| n >= 1)
                    .and_then(|n| self.get(n).copied())
                    .unwrap_or(UserCmd::NULL)
            })
            .collect();

        self.last_outgoing = newest;
        self.choked = 0;
        UserCmdBatch::new(self.backup_commands, commands)
    }

    fn slot(&self, number: u32) -> usize {
        number as usize % self.ring.len()
    }
}
