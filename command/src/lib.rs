//! User commands for tickwire.
//!
//! Clients number every tick of input, keep the last few in a
//! [`CommandBuffer`] and send them as delta-encoded USERCMD batches that
//! repeat recent commands as backups. The server queues each batch in a
//! [`CommandQueue`], reconstructs commands lost in transit from those
//! backups, and keeps each player's [`TickBase`] within a deadband of the
//! server tick.

mod batch;
mod buffer;
mod config;
mod error;
mod queue;
mod tickbase;
mod usercmd;

pub use batch::{decode_usercmd_batch, encode_usercmd_batch, UserCmdBatch};
pub use buffer::CommandBuffer;
pub use config::{time_to_ticks, CommandConfig, TickBaseConfig};
pub use error::{CommandError, CommandResult};
pub use queue::{CommandContext, CommandQueue};
pub use tickbase::TickBase;
pub use usercmd::UserCmd;
