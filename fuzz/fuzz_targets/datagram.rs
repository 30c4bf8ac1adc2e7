#![no_main]

use codec::{decode_snapshot, CodecLimits};
use command::{decode_usercmd_batch, CommandConfig};
use libfuzzer_sys::fuzz_target;
use schema::{FieldDef, FieldKind, Schema, SchemaRegistry};
use wire::MessageType;

fn schema() -> Schema {
    let mut registry = SchemaRegistry::new();
    let player = registry.register_class("player").unwrap();
    registry
        .add_field(player, FieldDef::new("origin", FieldKind::Vec3))
        .unwrap();
    registry
        .add_field(player, FieldDef::new("name", FieldKind::String))
        .unwrap();
    registry
        .add_field(player, FieldDef::new("stamp", FieldKind::Timestamp16))
        .unwrap();
    registry.build()
}

fuzz_target!(|data: &[u8]| {
    let schema = schema();
    let limits = CodecLimits::for_testing();
    let wire_limits = wire::Limits::for_testing();
    let commands = CommandConfig::default();

    let Ok(message) = wire::decode_message(data, &wire_limits) else {
        return;
    };
    match message.kind {
        MessageType::Snapshot => {
            let _ = decode_snapshot(&schema, &message, &limits);
        }
        MessageType::UserCmd => {
            let _ = decode_usercmd_batch(&message, &commands);
        }
        MessageType::Hello => {
            let _ = wire::decode_body::<wire::Hello>(&message, &wire_limits);
        }
        MessageType::HelloResponse => {
            let _ = wire::decode_body::<wire::HelloResponse>(&message, &wire_limits);
        }
        MessageType::Disconnect => {
            let _ = wire::decode_body::<wire::Disconnect>(&message, &wire_limits);
        }
        _ => {}
    }
});
