//! SNAPSHOT body encoding and tolerant decoding.
//!
//! Body layout: `mode u8`, `tick u32`, `entity_count u32`, then one record per
//! entity: `entity_id u32`, `class_id u16`, `field_count u16`, `record_len u16`
//! and `record_len` bytes of field data. Full records list every value in
//! schema order with no ids; delta records list `(field_id u8, value)` pairs.
//!
//! A snapshot too large for one datagram is split into several. Every part
//! but the last has [`SNAPSHOT_CONTINUED`] set in its mode byte.

use bytestream::{ByteReader, ByteWriter};
use log::warn;
use schema::{decode_value, encode_value, ClassId, ClassSchema, FieldId, FieldValue, Schema};
use wire::{MessageType, WireMessage};

use crate::change::{ChangeTracker, ChangedFields};
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::types::{EntityId, SnapshotTick};

/// Size of the body header before the first record.
pub const SNAPSHOT_HEADER_SIZE: usize = 1 + 4 + 4;

/// Size of an entity record header.
pub const RECORD_HEADER_SIZE: usize = 4 + 2 + 2 + 2;

/// Mode byte flag: more datagrams of the same snapshot follow.
pub const SNAPSHOT_CONTINUED: u8 = 0x80;

/// Framing used for every record of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SnapshotMode {
    Full = 0,
    Delta = 1,
}

impl SnapshotMode {
    pub fn parse(value: u8) -> CodecResult<Self> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::Delta),
            _ => Err(CodecError::InvalidMode { value }),
        }
    }

    /// Splits a mode byte into the mode and its continued flag.
    pub fn parse_header_byte(value: u8) -> CodecResult<(Self, bool)> {
        let mode = Self::parse(value & !SNAPSHOT_CONTINUED)?;
        Ok((mode, value & SNAPSHOT_CONTINUED != 0))
    }
}

/// Builds one SNAPSHOT datagram record by record.
///
/// A record that fails to encode is rolled back, leaving the datagram as it
/// was before the call, so the caller can skip the object and continue. A
/// record refused with [`CodecError::is_datagram_full`] fits in a new
/// encoder.
#[derive(Debug)]
pub struct SnapshotEncoder<'a> {
    schema: &'a Schema,
    limits: &'a CodecLimits,
    mode: SnapshotMode,
    out: ByteWriter,
    mode_slot: usize,
    count_slot: usize,
    entities: u32,
    max_bytes: usize,
}

impl<'a> SnapshotEncoder<'a> {
    #[must_use]
    pub fn new(
        schema: &'a Schema,
        limits: &'a CodecLimits,
        mode: SnapshotMode,
        tick: SnapshotTick,
    ) -> Self {
        let mut out = wire::begin_message(MessageType::Snapshot);
        let mode_slot = out.len();
        out.write_u8(mode as u8);
        out.write_u32(tick.raw());
        let count_slot = out.reserve_u32();
        Self {
            schema,
            limits,
            mode,
            out,
            mode_slot,
            count_slot,
            entities: 0,
            max_bytes: usize::MAX,
        }
    }

    /// Caps the datagram, message tag included, at `max_bytes`.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Bytes written so far, message tag included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    #[must_use]
    pub const fn mode(&self) -> SnapshotMode {
        self.mode
    }

    #[must_use]
    pub const fn entity_count(&self) -> u32 {
        self.entities
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entities == 0
    }

    /// Appends the record for one object.
    ///
    /// Full mode writes every field. Delta mode writes the fields `changes`
    /// reports and writes nothing for a clean object. Returns whether a
    /// record was written.
    pub fn write_entity(
        &mut self,
        entity: EntityId,
        class: ClassId,
        values: &[FieldValue],
        changes: &ChangeTracker,
    ) -> CodecResult<bool> {
        let schema = self.schema;
        let class_schema = schema.class(class).ok_or(CodecError::UnknownClassId {
            class: class.get(),
        })?;
        let field_count = class_schema.field_count();
        if values.len() != field_count {
            return Err(CodecError::FieldCountMismatch {
                class,
                expected: field_count,
                actual: values.len(),
            });
        }

        let changes = match self.mode {
            SnapshotMode::Full => ChangeTracker::new(),
            SnapshotMode::Delta => *changes,
        };
        let count = changes.changed_count(field_count);
        if count == 0 && self.mode == SnapshotMode::Delta {
            return Ok(false);
        }
        if count > self.limits.max_fields_per_entity {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::FieldsPerEntity,
                limit: self.limits.max_fields_per_entity,
                actual: count,
            });
        }
        if self.entities as usize >= self.limits.max_entities {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::Entities,
                limit: self.limits.max_entities,
                actual: self.entities as usize + 1,
            });
        }

        let start = self.out.len();
        let written = self.write_record(
            entity,
            class_schema,
            values,
            changes.changed_fields(field_count),
            count,
        );
        if let Err(err) = written {
            self.out.truncate(start);
            return Err(err);
        }
        if self.out.len() > self.max_bytes {
            let actual = self.out.len();
            self.out.truncate(start);
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::DatagramBytes,
                limit: self.max_bytes,
                actual,
            });
        }
        self.entities += 1;
        Ok(true)
    }

    fn write_record(
        &mut self,
        entity: EntityId,
        class_schema: &ClassSchema,
        values: &[FieldValue],
        fields: ChangedFields,
        count: usize,
    ) -> CodecResult<()> {
        let class = class_schema.id();
        self.out.write_u32(entity.raw());
        self.out.write_u16(class.get());
        self.out.write_u16(count as u16);
        let len_slot = self.out.reserve_u16();
        let data_start = self.out.len();

        for field in fields {
            let kind = class_schema.fields()[field.index()].kind;
            if self.mode == SnapshotMode::Delta {
                self.out.write_u8(field.get());
            }
            encode_value(kind, &values[field.index()], &mut self.out).map_err(|source| {
                CodecError::Field {
                    class,
                    field,
                    source,
                }
            })?;
        }

        let len = self.out.len() - data_start;
        let limit = self.limits.max_record_bytes.min(u16::MAX as usize);
        if len > limit {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::RecordBytes,
                limit,
                actual: len,
            });
        }
        self.out.patch_u16(len_slot, len as u16)?;
        Ok(())
    }

    /// Finishes the datagram, including its message tag.
    pub fn finish(self, wire_limits: &wire::Limits) -> CodecResult<Vec<u8>> {
        self.finish_part(false, wire_limits)
    }

    /// Finishes one datagram of a split snapshot. `continued` marks every
    /// part but the last.
    pub fn finish_part(mut self, continued: bool, wire_limits: &wire::Limits) -> CodecResult<Vec<u8>> {
        if continued {
            self.out
                .patch_u8(self.mode_slot, self.mode as u8 | SNAPSHOT_CONTINUED)?;
        }
        self.out.patch_u32(self.count_slot, self.entities)?;
        Ok(wire::finish_message(self.out, wire_limits)?)
    }
}

/// One entity as read from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntity {
    pub entity: EntityId,
    pub class: ClassId,
    /// Field ids with values; full records list every field in schema order.
    pub fields: Vec<(FieldId, FieldValue)>,
}

/// A record that could not be fully decoded.
///
/// Fields decoded before the failure still appear in
/// [`DecodedSnapshot::entities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    pub entity: EntityId,
    pub error: CodecError,
}

/// A decoded SNAPSHOT body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSnapshot {
    pub mode: SnapshotMode,
    /// More datagrams of this snapshot follow.
    pub continued: bool,
    pub tick: SnapshotTick,
    pub entities: Vec<DecodedEntity>,
    pub skipped: Vec<SkippedEntity>,
}

/// Decodes a framed SNAPSHOT message.
pub fn decode_snapshot(
    schema: &Schema,
    message: &WireMessage<'_>,
    limits: &CodecLimits,
) -> CodecResult<DecodedSnapshot> {
    message.expect(MessageType::Snapshot)?;
    decode_snapshot_body(schema, message.body, limits)
}

/// Decodes a SNAPSHOT body.
///
/// Errors inside one entity record (unknown class, unknown field id, bad
/// value) skip that record and are reported in [`DecodedSnapshot::skipped`].
/// Errors in the body header or record framing drop the whole datagram.
pub fn decode_snapshot_body(
    schema: &Schema,
    body: &[u8],
    limits: &CodecLimits,
) -> CodecResult<DecodedSnapshot> {
    let mut reader = ByteReader::new(body);
    let (mode, continued) = SnapshotMode::parse_header_byte(reader.read_u8()?)?;
    let tick = SnapshotTick::new(reader.read_u32()?);
    let count = reader.read_u32()? as usize;
    if count > limits.max_entities {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Entities,
            limit: limits.max_entities,
            actual: count,
        });
    }

    let mut entities = Vec::with_capacity(count.min(reader.remaining() / RECORD_HEADER_SIZE));
    let mut skipped = Vec::new();

    for _ in 0..count {
        let entity = EntityId::new(reader.read_u32()?);
        let class_raw = reader.read_u16()?;
        let field_count = usize::from(reader.read_u16()?);
        let record_len = usize::from(reader.read_u16()?);
        let data = reader.read_bytes(record_len)?;

        let Some(class_schema) = schema.class(ClassId::new(class_raw)) else {
            let error = CodecError::UnknownClassId { class: class_raw };
            warn!("skipping entity {}: {error}", entity.raw());
            skipped.push(SkippedEntity { entity, error });
            continue;
        };

        let mut fields = Vec::with_capacity(field_count.min(class_schema.field_count()));
        let result = decode_fields(class_schema, mode, field_count, data, limits, &mut fields);
        let class = class_schema.id();
        match result {
            Ok(()) => entities.push(DecodedEntity {
                entity,
                class,
                fields,
            }),
            Err(error) => {
                warn!(
                    "skipping rest of entity {} after {} fields: {error}",
                    entity.raw(),
                    fields.len()
                );
                if !fields.is_empty() {
                    entities.push(DecodedEntity {
                        entity,
                        class,
                        fields,
                    });
                }
                skipped.push(SkippedEntity { entity, error });
            }
        }
    }

    if !reader.is_empty() {
        return Err(CodecError::Wire(wire::DecodeError::TrailingBytes {
            message: MessageType::Snapshot,
            remaining: reader.remaining(),
        }));
    }

    Ok(DecodedSnapshot {
        mode,
        continued,
        tick,
        entities,
        skipped,
    })
}

fn decode_fields(
    class_schema: &ClassSchema,
    mode: SnapshotMode,
    field_count: usize,
    data: &[u8],
    limits: &CodecLimits,
    fields: &mut Vec<(FieldId, FieldValue)>,
) -> CodecResult<()> {
    if field_count > limits.max_fields_per_entity {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::FieldsPerEntity,
            limit: limits.max_fields_per_entity,
            actual: field_count,
        });
    }
    if data.len() > limits.max_record_bytes {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::RecordBytes,
            limit: limits.max_record_bytes,
            actual: data.len(),
        });
    }

    let class = class_schema.id();
    let mut reader = ByteReader::new(data);
    match mode {
        SnapshotMode::Full => {
            if field_count != class_schema.field_count() {
                return Err(CodecError::FieldCountMismatch {
                    class,
                    expected: class_schema.field_count(),
                    actual: field_count,
                });
            }
            for (field, def) in class_schema.field_ids().zip(class_schema.fields()) {
                let value = decode_value(def.kind, &mut reader).map_err(|source| {
                    CodecError::Field {
                        class,
                        field,
                        source,
                    }
                })?;
                fields.push((field, value));
            }
        }
        SnapshotMode::Delta => {
            for _ in 0..field_count {
                let raw = reader.read_u8()?;
                let field = FieldId::new(raw);
                let def = class_schema
                    .field(field)
                    .ok_or(CodecError::UnknownFieldId { class, field: raw })?;
                let value = decode_value(def.kind, &mut reader).map_err(|source| {
                    CodecError::Field {
                        class,
                        field,
                        source,
                    }
                })?;
                fields.push((field, value));
            }
        }
    }

    if !reader.is_empty() {
        return Err(CodecError::TrailingRecordBytes {
            remaining: reader.remaining(),
        });
    }
    Ok(())
}
