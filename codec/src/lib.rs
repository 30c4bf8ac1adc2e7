//! Change tracking and snapshot encoding/decoding for tickwire.
//!
//! This crate ties together bytestream, wire, and schema to turn live object
//! state into SNAPSHOT datagrams and back.
//!
//! # Features
//!
//! - Per-object change tracking with a bounded change set
//! - Full and delta snapshot encoding
//! - Tolerant decoding that skips undecodable entities and keeps going
//!
//! # Design Principles
//!
//! - **Correctness first** - All invariants are documented and tested.
//! - **Contained failures** - A bad object or record never poisons the rest of a snapshot.
//! - **Deterministic** - Same inputs produce same outputs.

mod change;
mod error;
mod limits;
mod snapshot;
mod types;

pub use change::{ChangeState, ChangeTracker, ChangedFields, CHANGE_SET_CAPACITY};
pub use error::{CodecError, CodecResult, LimitKind};
pub use limits::CodecLimits;
pub use snapshot::{
    decode_snapshot, decode_snapshot_body, DecodedEntity, DecodedSnapshot, SkippedEntity,
    SnapshotEncoder, SnapshotMode, RECORD_HEADER_SIZE, SNAPSHOT_CONTINUED, SNAPSHOT_HEADER_SIZE,
};
pub use types::{EntityId, SnapshotTick};
pub use wire::Limits as WireLimits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = SnapshotTick::new(0);
        let _ = EntityId::new(0);
        let _ = WireLimits::default();
        let _ = CodecLimits::default();
        let _ = ChangeTracker::new();
        let _: CodecResult<()> = Ok(());
    }

    #[test]
    fn change_set_capacity_matches_wire_field_ids() {
        assert!(CHANGE_SET_CAPACITY <= schema::MAX_FIELDS_PER_CLASS);
    }
}
