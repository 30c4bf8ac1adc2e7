//! USERCMD message framing.
//!
//! Body layout: `backup u8`, `new u8`, then `backup + new` command records
//! oldest first, each delta-encoded against its predecessor. The first record
//! is encoded against [`UserCmd::NULL`].

use wire::{Limits, MessageType, WireMessage};

use crate::config::CommandConfig;
use crate::error::{CommandError, CommandResult};
use crate::usercmd::UserCmd;

/// A batch of commands as carried by one USERCMD message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserCmdBatch {
    /// Number of leading commands repeated from earlier batches.
    pub backup_count: usize,
    /// Backups followed by new commands, oldest first.
    pub commands: Vec<UserCmd>,
}

impl UserCmdBatch {
    #[must_use]
    pub fn new(backup_count: usize, commands: Vec<UserCmd>) -> Self {
        Self {
            backup_count,
            commands,
        }
    }

    #[must_use]
    pub fn new_count(&self) -> usize {
        self.commands.len().saturating_sub(self.backup_count)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.commands.len()
    }

    /// The freshly generated commands, oldest first.
    #[must_use]
    pub fn new_commands(&self) -> &[UserCmd] {
        let start = self.backup_count.min(self.commands.len());
        &self.commands[start..]
    }

    /// The newest command, if any.
    #[must_use]
    pub fn newest(&self) -> Option<&UserCmd> {
        self.commands.last()
    }
}

/// Encodes a batch as a complete USERCMD message.
pub fn encode_usercmd_batch(
    batch: &UserCmdBatch,
    config: &CommandConfig,
    limits: &Limits,
) -> CommandResult<Vec<u8>> {
    let total = batch.total();
    let limit = config.max_batch_commands.min(usize::from(u8::MAX));
    if total > limit {
        return Err(CommandError::TooManyCommands { total, limit });
    }
    if batch.new_count() == 0 {
        return Err(CommandError::NoNewCommands);
    }

    let mut out = wire::begin_message(MessageType::UserCmd);
    out.write_u8(batch.backup_count as u8);
    out.write_u8(batch.new_count() as u8);
    let mut from = UserCmd::NULL;
    for cmd in &batch.commands {
        cmd.write_delta(&from, &mut out);
        from = *cmd;
    }
    Ok(wire::finish_message(out, limits)?)
}

/// Decodes the body of a USERCMD message.
///
/// Batches declaring `max_batch_commands` or more commands in total are
/// rejected before any record is read.
pub fn decode_usercmd_batch(
    message: &WireMessage<'_>,
    config: &CommandConfig,
) -> CommandResult<UserCmdBatch> {
    message.expect(MessageType::UserCmd)?;
    let mut reader = message.reader();

    let backup_count = usize::from(reader.read_u8()?);
    let new_count = usize::from(reader.read_u8()?);
    let total = backup_count + new_count;
    if total > config.max_batch_commands {
        return Err(CommandError::TooManyCommands {
            total,
            limit: config.max_batch_commands,
        });
    }
    if new_count == 0 {
        return Err(CommandError::NoNewCommands);
    }

    let mut commands = Vec::with_capacity(total);
    let mut from = UserCmd::NULL;
    for _ in 0..total {
        let cmd = UserCmd::read_delta(&mut reader, &from)?;
        commands.push(cmd);
        from = cmd;
    }

    if !reader.is_empty() {
        return Err(CommandError::TrailingBytes {
            remaining: reader.remaining(),
        });
    }

    Ok(UserCmdBatch {
        backup_count,
        commands,
    })
}
