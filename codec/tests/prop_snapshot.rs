//! Property tests for delta completeness and decoder robustness.

use std::collections::BTreeSet;

use codec::{
    decode_snapshot_body, ChangeState, ChangeTracker, CodecLimits, EntityId, SnapshotEncoder,
    SnapshotMode, SnapshotTick, CHANGE_SET_CAPACITY,
};
use proptest::prelude::*;
use schema::{ClassId, FieldDef, FieldId, FieldKind, FieldValue, Schema, SchemaRegistry};

const FIELD_COUNT: u8 = 40;

fn wide_schema() -> (Schema, ClassId) {
    let mut registry = SchemaRegistry::new();
    let class = registry.register_class("wide").unwrap();
    for i in 0..FIELD_COUNT {
        registry
            .add_field(class, FieldDef::new(format!("f{i}"), FieldKind::uint(32)))
            .unwrap();
    }
    (registry.build(), class)
}

fn values() -> Vec<FieldValue> {
    (0..u64::from(FIELD_COUNT))
        .map(|i| FieldValue::UInt(i * 1000))
        .collect()
}

proptest! {
    #[test]
    fn delta_contains_exactly_the_marked_fields(
        marks in prop::collection::vec(0u8..FIELD_COUNT, 1..60)
    ) {
        let (schema, class) = wide_schema();
        let limits = CodecLimits::default();
        let mut tracker = ChangeTracker::clean();
        for id in &marks {
            tracker.mark_changed(FieldId::new(*id));
        }
        let distinct: BTreeSet<u8> = marks.iter().copied().collect();

        let mut encoder = SnapshotEncoder::new(&schema, &limits, SnapshotMode::Delta, SnapshotTick::new(1));
        encoder.write_entity(EntityId::new(1), class, &values(), &tracker).unwrap();
        let bytes = encoder.finish(&wire::Limits::default()).unwrap();
        let decoded = decode_snapshot_body(&schema, &bytes[wire::TAG_SIZE..], &limits).unwrap();

        let ids: Vec<u8> = decoded.entities[0].fields.iter().map(|(id, _)| id.get()).collect();
        if distinct.len() > CHANGE_SET_CAPACITY {
            prop_assert_eq!(tracker.state(), ChangeState::Full);
            prop_assert_eq!(ids, (0..FIELD_COUNT).collect::<Vec<_>>());
        } else {
            prop_assert_eq!(ids, distinct.into_iter().collect::<Vec<_>>());
        }
        for (id, value) in &decoded.entities[0].fields {
            prop_assert_eq!(value, &FieldValue::UInt(u64::from(id.get()) * 1000));
        }
    }

    #[test]
    fn decoder_never_panics(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let (schema, _) = wide_schema();
        let _ = decode_snapshot_body(&schema, &body, &CodecLimits::for_testing());
    }
}
