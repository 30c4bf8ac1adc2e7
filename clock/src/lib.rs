//! Clock synchronization for tickwire.
//!
//! [`ClockDelta`] tracks the offset between the local clock and network
//! time as an interval that widens with drift and narrows with every
//! overlapping sample. Network timestamps travel as wrapping 16-bit tick
//! counters; [`ClockDelta::network_to_local_time`] resolves them against the
//! current estimate. [`TimeSync`] drives the CLOCK_SYNC request/response
//! cycle on the client.

mod config;
mod delta;
mod error;
mod sync;

pub use config::{ClockConfig, TimeSyncConfig};
pub use delta::{sign_extend16, ClockDelta};
pub use error::{ClockError, ClockResult};
pub use sync::{SyncOutcome, TimeSync};
