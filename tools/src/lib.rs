//! Inspection and decoding tools for tickwire captures.
//!
//! A capture is a directory of raw datagrams, one per file, plus the
//! `schema.json` the sender was built with. This crate provides:
//!
//! - Loading a schema back from its JSON form, checked against its hash
//! - Per-datagram size and content reports
//! - Full JSON decoding of any message kind
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to see what went over the wire.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use bytestream::ByteReader;
use codec::{decode_snapshot, CodecLimits, SnapshotMode};
use command::{decode_usercmd_batch, CommandConfig, UserCmd};
use schema::{FieldDef, Schema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wire::{
    ClientState, ClockSyncRequest, ClockSyncResponse, Disconnect, EntityDelete, Hello,
    HelloResponse, MessageType, Tick, WireMessage,
};

/// The JSON form of a schema, as written by `serde_json::to_string(&schema)`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    pub classes: Vec<ClassFile>,
    #[serde(default)]
    pub hash: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassFile {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// Rebuilds a schema from JSON by registering its classes in order.
///
/// Fails if the rebuilt hash differs from the recorded one.
pub fn schema_from_json(json: &str) -> Result<Schema> {
    let file: SchemaFile = serde_json::from_str(json).context("parse schema json")?;
    let mut registry = SchemaRegistry::new();
    for class in file.classes {
        let id = registry
            .register_class(&class.name)
            .with_context(|| format!("register class {}", class.name))?;
        for field in class.fields {
            let name = field.name.clone();
            registry
                .add_field(id, field)
                .with_context(|| format!("add field {}.{name}", class.name))?;
        }
    }
    let schema = registry.build();
    if let Some(expected) = file.hash {
        if expected != schema.hash() {
            bail!(
                "schema hash mismatch: file says 0x{expected:016x}, rebuilt 0x{:016x}",
                schema.hash()
            );
        }
    }
    Ok(schema)
}

/// Size and content summary of one datagram.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub kind: &'static str,
    pub tag: u16,
    pub datagram_bytes: usize,
    pub body_bytes: usize,
    pub snapshot: Option<SnapshotSummary>,
    pub commands: Option<CommandSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub mode: &'static str,
    /// More datagrams of the same snapshot follow.
    pub continued: bool,
    pub tick: u32,
    pub entities: u32,
    /// Only known when a schema was given.
    pub skipped: Option<usize>,
    pub changed_fields: Option<usize>,
    pub by_class: Vec<ClassCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassCount {
    pub class: u16,
    pub name: String,
    pub entities: usize,
    pub fields: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandSummary {
    pub backup: usize,
    pub new: usize,
    pub newest: Option<u32>,
}

/// Reports on one datagram. Snapshot records are only decoded when a
/// schema is given; otherwise just the snapshot header is read.
pub fn inspect_datagram(
    bytes: &[u8],
    schema: Option<&Schema>,
    wire_limits: &wire::Limits,
    codec_limits: &CodecLimits,
) -> Result<InspectReport> {
    let message = wire::decode_message(bytes, wire_limits).context("decode datagram")?;
    let mut report = InspectReport {
        kind: message.kind.name(),
        tag: message.kind.tag(),
        datagram_bytes: bytes.len(),
        body_bytes: message.body.len(),
        snapshot: None,
        commands: None,
    };

    match message.kind {
        MessageType::Snapshot => {
            report.snapshot = Some(match schema {
                Some(schema) => summarize_snapshot(schema, &message, codec_limits)?,
                None => snapshot_header(&message)?,
            });
        }
        MessageType::UserCmd => {
            let batch = decode_usercmd_batch(&message, &CommandConfig::default())
                .context("decode usercmd batch")?;
            report.commands = Some(CommandSummary {
                backup: batch.backup_count,
                new: batch.new_count(),
                newest: batch.newest().map(|cmd| cmd.command_number),
            });
        }
        _ => {}
    }
    Ok(report)
}

fn snapshot_header(message: &WireMessage<'_>) -> Result<SnapshotSummary> {
    let mut reader = ByteReader::new(message.body);
    let (mode, continued) = SnapshotMode::parse_header_byte(reader.read_u8()?)?;
    let tick = reader.read_u32()?;
    let entities = reader.read_u32()?;
    Ok(SnapshotSummary {
        mode: mode_name(mode),
        continued,
        tick,
        entities,
        skipped: None,
        changed_fields: None,
        by_class: Vec::new(),
    })
}

fn summarize_snapshot(
    schema: &Schema,
    message: &WireMessage<'_>,
    limits: &CodecLimits,
) -> Result<SnapshotSummary> {
    let decoded = decode_snapshot(schema, message, limits).context("decode snapshot")?;
    let mut by_class: BTreeMap<u16, ClassCount> = BTreeMap::new();
    for entity in &decoded.entities {
        let count = by_class
            .entry(entity.class.get())
            .or_insert_with(|| ClassCount {
                class: entity.class.get(),
                name: schema
                    .class(entity.class)
                    .map_or_else(|| String::from("?"), |class| class.name().to_owned()),
                entities: 0,
                fields: 0,
            });
        count.entities += 1;
        count.fields += entity.fields.len();
    }
    let changed_fields = by_class.values().map(|count| count.fields).sum();
    Ok(SnapshotSummary {
        mode: mode_name(decoded.mode),
        continued: decoded.continued,
        tick: decoded.tick.raw(),
        entities: (decoded.entities.len() + decoded.skipped.len()) as u32,
        skipped: Some(decoded.skipped.len()),
        changed_fields: Some(changed_fields),
        by_class: by_class.into_values().collect(),
    })
}

const fn mode_name(mode: SnapshotMode) -> &'static str {
    match mode {
        SnapshotMode::Full => "full",
        SnapshotMode::Delta => "delta",
    }
}

/// Decodes any datagram into JSON, resolving class and field names
/// through `schema`.
pub fn decode_datagram_json(
    bytes: &[u8],
    schema: &Schema,
    wire_limits: &wire::Limits,
    codec_limits: &CodecLimits,
) -> Result<Value> {
    let message = wire::decode_message(bytes, wire_limits).context("decode datagram")?;
    let body = match message.kind {
        MessageType::Hello => {
            let hello: Hello = wire::decode_body(&message, wire_limits)?;
            json!({
                "protocol_version": hello.protocol_version,
                "schema_hash": format!("0x{:016x}", hello.schema_hash),
            })
        }
        MessageType::HelloResponse => {
            let response: HelloResponse = wire::decode_body(&message, wire_limits)?;
            json!({
                "tick_rate": response.tick_rate,
                "client_id": response.client_id,
                "player_entity": response.player_entity,
                "world_name": response.world_name,
            })
        }
        MessageType::ClientState => {
            let state: ClientState = wire::decode_body(&message, wire_limits)?;
            json!({ "state": format!("{state:?}") })
        }
        MessageType::Tick => {
            let tick: Tick = wire::decode_body(&message, wire_limits)?;
            json!({ "tick": tick.tick, "interval": tick.interval })
        }
        MessageType::Snapshot => snapshot_json(schema, &message, codec_limits)?,
        MessageType::EntityDelete => {
            let delete: EntityDelete = wire::decode_body(&message, wire_limits)?;
            json!({ "entity": delete.entity_id })
        }
        MessageType::UserCmd => {
            let batch = decode_usercmd_batch(&message, &CommandConfig::default())
                .context("decode usercmd batch")?;
            json!({
                "backup": batch.backup_count,
                "commands": batch.commands.iter().map(usercmd_json).collect::<Vec<_>>(),
            })
        }
        MessageType::ClockSyncRequest => {
            let request: ClockSyncRequest = wire::decode_body(&message, wire_limits)?;
            json!({ "context": request.context })
        }
        MessageType::ClockSyncResponse => {
            let response: ClockSyncResponse = wire::decode_body(&message, wire_limits)?;
            json!({ "context": response.context, "timestamp": response.timestamp })
        }
        MessageType::Disconnect => {
            let notice: Disconnect = wire::decode_body(&message, wire_limits)?;
            json!({ "reason": notice.reason })
        }
        kind => bail!("no decoder for {kind}"),
    };
    Ok(json!({ "kind": message.kind.name(), "body": body }))
}

fn snapshot_json(schema: &Schema, message: &WireMessage<'_>, limits: &CodecLimits) -> Result<Value> {
    let decoded = decode_snapshot(schema, message, limits).context("decode snapshot")?;
    let entities: Vec<Value> = decoded
        .entities
        .iter()
        .map(|entity| {
            let class = schema.class(entity.class);
            let mut fields = serde_json::Map::new();
            for (field, value) in &entity.fields {
                let name = class
                    .and_then(|class| class.field(*field))
                    .map_or_else(|| format!("#{}", field.get()), |def| def.name.clone());
                fields.insert(name, serde_json::to_value(value).unwrap_or(Value::Null));
            }
            json!({
                "entity": entity.entity.raw(),
                "class": class.map_or("?", |class| class.name()),
                "fields": fields,
            })
        })
        .collect();
    let skipped: Vec<Value> = decoded
        .skipped
        .iter()
        .map(|skipped| json!({ "entity": skipped.entity.raw(), "error": skipped.error.to_string() }))
        .collect();
    Ok(json!({
        "mode": mode_name(decoded.mode),
        "continued": decoded.continued,
        "tick": decoded.tick.raw(),
        "entities": entities,
        "skipped": skipped,
    }))
}

fn usercmd_json(cmd: &UserCmd) -> Value {
    json!({
        "command_number": cmd.command_number,
        "tick_count": cmd.tick_count,
        "view_angles": cmd.view_angles,
        "move": [cmd.forward_move, cmd.side_move, cmd.up_move],
        "buttons": cmd.buttons,
        "weapon": [cmd.weapon_select, cmd.weapon_subtype],
        "mouse": [cmd.mouse_dx, cmd.mouse_dy],
    })
}

/// Renders decoded JSON as indented `key: value` lines.
#[must_use]
pub fn format_decode_pretty(value: &Value) -> String {
    let mut out = String::new();
    write_pretty(&mut out, value, 0);
    out
}

fn write_pretty(out: &mut String, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if is_scalar(value) {
                    out.push_str(&format!("{indent}{key}: {}\n", scalar(value)));
                } else {
                    out.push_str(&format!("{indent}{key}:\n"));
                    write_pretty(out, value, depth + 1);
                }
            }
        }
        Value::Array(items) if items.iter().all(is_scalar) => {
            let joined: Vec<String> = items.iter().map(scalar).collect();
            out.push_str(&format!("{indent}[{}]\n", joined.join(", ")));
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                out.push_str(&format!("{indent}- [{index}]\n"));
                write_pretty(out, item, depth + 1);
            }
        }
        other => out.push_str(&format!("{indent}{}\n", scalar(other))),
    }
}

fn is_scalar(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items.iter().all(|item| !item.is_object() && !item.is_array()),
        _ => true,
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().map(scalar).collect();
            format!("[{}]", joined.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{ChangeTracker, EntityId, SnapshotEncoder, SnapshotTick};
    use schema::FieldValue;

    fn schema() -> Schema {
        demo_schema::demo_schema().unwrap().0
    }

    fn full_snapshot(schema: &Schema) -> Vec<u8> {
        let (_, classes) = demo_schema::demo_schema().unwrap();
        let class = schema.class(classes.projectile.class).unwrap();
        let values: Vec<FieldValue> = class
            .fields()
            .iter()
            .map(|field| field.kind.default_value())
            .collect();
        let limits = CodecLimits::default();
        let mut encoder =
            SnapshotEncoder::new(schema, &limits, SnapshotMode::Full, SnapshotTick::new(7));
        encoder
            .write_entity(EntityId::new(3), class.id(), &values, &ChangeTracker::new())
            .unwrap();
        encoder.finish(&wire::Limits::default()).unwrap()
    }

    #[test]
    fn schema_json_roundtrip_keeps_hash() {
        let schema = schema();
        let json = serde_json::to_string(&schema).unwrap();
        let rebuilt = schema_from_json(&json).unwrap();
        assert_eq!(rebuilt.hash(), schema.hash());
    }

    #[test]
    fn schema_json_hash_mismatch_fails() {
        let json = r#"{"classes":[{"name":"a","fields":[]}],"hash":1}"#;
        assert!(schema_from_json(json).is_err());
    }

    #[test]
    fn inspect_snapshot_with_and_without_schema() {
        let schema = schema();
        let bytes = full_snapshot(&schema);
        let limits = (wire::Limits::default(), CodecLimits::default());

        let bare = inspect_datagram(&bytes, None, &limits.0, &limits.1).unwrap();
        assert_eq!(bare.kind, MessageType::Snapshot.name());
        let summary = bare.snapshot.unwrap();
        assert_eq!((summary.mode, summary.tick, summary.entities), ("full", 7, 1));
        assert_eq!(summary.skipped, None);
        assert!(!summary.continued);

        let detailed = inspect_datagram(&bytes, Some(&schema), &limits.0, &limits.1).unwrap();
        let summary = detailed.snapshot.unwrap();
        assert_eq!(summary.by_class.len(), 1);
        assert_eq!(summary.by_class[0].name, "projectile");
        assert_eq!(summary.by_class[0].fields, 4);
    }

    #[test]
    fn decode_control_message() {
        let bytes = wire::encode_message(
            &Tick {
                tick: 12,
                interval: 0.5,
            },
            &wire::Limits::default(),
        )
        .unwrap();
        let value = decode_datagram_json(
            &bytes,
            &schema(),
            &wire::Limits::default(),
            &CodecLimits::default(),
        )
        .unwrap();
        assert_eq!(value["body"]["tick"], 12);
        assert!(format_decode_pretty(&value).contains("tick: 12"));
    }

    #[test]
    fn decode_snapshot_names_fields() {
        let schema = schema();
        let bytes = full_snapshot(&schema);
        let value = decode_datagram_json(
            &bytes,
            &schema,
            &wire::Limits::default(),
            &CodecLimits::default(),
        )
        .unwrap();
        let entity = &value["body"]["entities"][0];
        assert_eq!(entity["class"], "projectile");
        assert!(entity["fields"].get("owner").is_some());
    }
}
