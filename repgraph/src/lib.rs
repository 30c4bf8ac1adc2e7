//! Replication graph: the live object registry and per-client snapshot building.
//!
//! The graph owns every replicated object, records field writes in each
//! object's change set, and turns that state into SNAPSHOT datagrams for
//! each client. A snapshot larger than one datagram is split into several
//! parts. Dirtiness is reset once per tick, after every client has been
//! served.

mod error;
mod object;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use codec::{CodecLimits, EntityId, SnapshotEncoder, SnapshotMode, SnapshotTick};
use log::warn;
use schema::{ClassId, FieldError, FieldId, FieldValue, Schema};

pub use error::{GraphError, GraphResult};
pub use object::ReplicatedObject;

/// Client identifier, as carried in HELLO_RESP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u16);

/// Replication graph configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Maximum live objects (hard safety cap).
    ///
    /// Independent of `codec_limits.max_entities`, which only bounds the
    /// records in one datagram.
    pub max_entities: usize,
    /// Per-datagram record limits.
    pub codec_limits: CodecLimits,
    /// `max_message_bytes` is the byte budget of each snapshot datagram.
    pub wire_limits: wire::Limits,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_entities: 1_000_000,
            codec_limits: CodecLimits::default(),
            wire_limits: wire::Limits::default(),
        }
    }
}

impl ReplicationConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_entities: 64,
            codec_limits: CodecLimits::for_testing(),
            wire_limits: wire::Limits::for_testing(),
        }
    }
}

/// One snapshot datagram built for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub mode: SnapshotMode,
    pub entities: u32,
    /// More parts of the same snapshot follow.
    pub continued: bool,
    /// The complete datagram, message tag included.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ClientState {
    needs_full: bool,
}

/// Live object registry with per-client snapshot state.
#[derive(Debug, Clone)]
pub struct ReplicationGraph {
    schema: Arc<Schema>,
    config: ReplicationConfig,
    objects: BTreeMap<EntityId, ReplicatedObject>,
    removed: Vec<EntityId>,
    clients: HashMap<ClientId, ClientState>,
    next_entity: u32,
}

impl ReplicationGraph {
    #[must_use]
    pub fn new(schema: Arc<Schema>, config: ReplicationConfig) -> Self {
        Self {
            schema,
            config,
            objects: BTreeMap::new(),
            removed: Vec::new(),
            clients: HashMap::new(),
            next_entity: 1,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&ReplicatedObject> {
        self.objects.get(&entity)
    }

    /// Live objects in entity id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &ReplicatedObject)> + '_ {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    /// Creates an object of `class` with default values. It starts fully changed.
    pub fn spawn(&mut self, class: ClassId) -> GraphResult<EntityId> {
        let class_schema = self
            .schema
            .class(class)
            .ok_or(GraphError::UnknownClass { class })?;
        if self.objects.len() >= self.config.max_entities {
            return Err(GraphError::TooManyEntities {
                limit: self.config.max_entities,
            });
        }

        let mut raw = self.next_entity;
        while raw == 0 || self.objects.contains_key(&EntityId::new(raw)) {
            raw = raw.wrapping_add(1);
        }
        self.next_entity = raw.wrapping_add(1);

        let entity = EntityId::new(raw);
        self.objects
            .insert(entity, ReplicatedObject::new(class_schema));
        Ok(entity)
    }

    /// Removes an object and queues an ENTITY_DELETE for it.
    pub fn remove(&mut self, entity: EntityId) -> GraphResult<()> {
        self.objects
            .remove(&entity)
            .ok_or(GraphError::UnknownEntity { entity })?;
        self.removed.push(entity);
        Ok(())
    }

    /// Writes one field. Returns `true` if the stored value changed.
    ///
    /// A write of an equal value is not recorded as a change.
    pub fn set(&mut self, entity: EntityId, field: FieldId, value: FieldValue) -> GraphResult<bool> {
        let object = self
            .objects
            .get_mut(&entity)
            .ok_or(GraphError::UnknownEntity { entity })?;
        let class = object.class();
        let def = self
            .schema
            .class(class)
            .and_then(|schema| schema.field(field))
            .ok_or(GraphError::UnknownField { class, field })?;
        if !value.matches(def.kind) {
            return Err(GraphError::InvalidValue {
                entity,
                field,
                source: FieldError::TypeMismatch {
                    kind: def.kind,
                    found: value.type_name(),
                },
            });
        }
        Ok(object.store(field, value))
    }

    /// Resolves `name` through the class's field map, then writes it.
    pub fn set_by_name(
        &mut self,
        entity: EntityId,
        name: &str,
        value: FieldValue,
    ) -> GraphResult<bool> {
        let class = self
            .objects
            .get(&entity)
            .ok_or(GraphError::UnknownEntity { entity })?
            .class();
        let field = self
            .schema
            .class(class)
            .and_then(|schema| schema.field_id(name))
            .ok_or_else(|| GraphError::UnknownFieldName {
                class,
                name: name.to_owned(),
            })?;
        self.set(entity, field, value)
    }

    /// Forces the whole object into the next delta.
    pub fn mark_fully_changed(&mut self, entity: EntityId) -> GraphResult<()> {
        self.objects
            .get_mut(&entity)
            .ok_or(GraphError::UnknownEntity { entity })?
            .mark_fully_changed();
        Ok(())
    }

    /// Starts tracking a client. Its first snapshot will be full.
    pub fn add_client(&mut self, client: ClientId) {
        self.clients
            .insert(client, ClientState { needs_full: true });
    }

    pub fn remove_client(&mut self, client: ClientId) {
        self.clients.remove(&client);
    }

    #[must_use]
    pub fn has_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Makes the client's next snapshot full.
    pub fn request_full(&mut self, client: ClientId) {
        if let Some(state) = self.clients.get_mut(&client) {
            state.needs_full = true;
        }
    }

    /// Builds the snapshot datagrams for one client, in send order.
    ///
    /// The snapshot is full when `full` is set or the client has not yet
    /// received one. Records go into one datagram until the next would pass
    /// the wire message budget or the per-datagram entity limit, then a new
    /// part is started. A delta with no changed objects returns no parts.
    /// Objects that fail to encode, even alone in a datagram, are skipped
    /// with a warning.
    pub fn build_snapshot(
        &self,
        client: ClientId,
        full: bool,
        tick: SnapshotTick,
    ) -> codec::CodecResult<Vec<ClientSnapshot>> {
        let needs_full = self
            .clients
            .get(&client)
            .map_or(true, |state| state.needs_full);
        let mode = if full || needs_full {
            SnapshotMode::Full
        } else {
            SnapshotMode::Delta
        };

        let mut parts = Vec::new();
        let mut encoder = self.encoder(mode, tick);
        for (entity, object) in &self.objects {
            let mut written =
                encoder.write_entity(*entity, object.class(), object.values(), object.changes());
            if matches!(&written, Err(err) if err.is_datagram_full()) && !encoder.is_empty() {
                let done = std::mem::replace(&mut encoder, self.encoder(mode, tick));
                parts.push(self.finish_part(done, true)?);
                written =
                    encoder.write_entity(*entity, object.class(), object.values(), object.changes());
            }
            if let Err(err) = written {
                warn!(
                    "skipping entity {} in snapshot for client {}: {err}",
                    entity.raw(),
                    client.0
                );
            }
        }

        if mode == SnapshotMode::Delta && parts.is_empty() && encoder.is_empty() {
            return Ok(Vec::new());
        }
        parts.push(self.finish_part(encoder, false)?);
        Ok(parts)
    }

    fn encoder(&self, mode: SnapshotMode, tick: SnapshotTick) -> SnapshotEncoder<'_> {
        SnapshotEncoder::new(&self.schema, &self.config.codec_limits, mode, tick)
            .with_max_bytes(self.config.wire_limits.max_message_bytes)
    }

    fn finish_part(
        &self,
        encoder: SnapshotEncoder<'_>,
        continued: bool,
    ) -> codec::CodecResult<ClientSnapshot> {
        let mode = encoder.mode();
        let entities = encoder.entity_count();
        let bytes = encoder.finish_part(continued, &self.config.wire_limits)?;
        Ok(ClientSnapshot {
            mode,
            entities,
            continued,
            bytes,
        })
    }

    /// Records that a snapshot reached the transport for `client`.
    pub fn snapshot_sent(&mut self, client: ClientId, mode: SnapshotMode) {
        if mode == SnapshotMode::Full {
            if let Some(state) = self.clients.get_mut(&client) {
                state.needs_full = false;
            }
        }
    }

    /// Resets every object's change set. Call once per tick after all clients
    /// have been served.
    pub fn clear_changes(&mut self) {
        for object in self.objects.values_mut() {
            object.clear_changes();
        }
    }

    /// Takes the entities removed since the last call.
    pub fn drain_removed(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::decode_snapshot_body;
    use schema::{FieldDef, FieldKind, SchemaRegistry};

    fn graph() -> (ReplicationGraph, ClassId) {
        graph_with(ReplicationConfig::for_testing())
    }

    fn graph_with(config: ReplicationConfig) -> (ReplicationGraph, ClassId) {
        let mut registry = SchemaRegistry::new();
        let player = registry.register_class("player").unwrap();
        registry
            .add_field(player, FieldDef::new("origin", FieldKind::Vec3))
            .unwrap();
        registry
            .add_field(player, FieldDef::new("health", FieldKind::int(16)))
            .unwrap();
        let schema = Arc::new(registry.build());
        (ReplicationGraph::new(schema, config), player)
    }

    fn single(mut parts: Vec<ClientSnapshot>) -> ClientSnapshot {
        assert_eq!(parts.len(), 1);
        let part = parts.remove(0);
        assert!(!part.continued);
        part
    }

    fn decode(graph: &ReplicationGraph, snapshot: &ClientSnapshot) -> codec::DecodedSnapshot {
        decode_snapshot_body(
            graph.schema(),
            &snapshot.bytes[wire::TAG_SIZE..],
            &CodecLimits::for_testing(),
        )
        .unwrap()
    }

    #[test]
    fn spawn_assigns_ids_from_one_with_defaults() {
        let (mut graph, player) = graph();
        let a = graph.spawn(player).unwrap();
        let b = graph.spawn(player).unwrap();
        assert_eq!(a, EntityId::new(1));
        assert_eq!(b, EntityId::new(2));
        let object = graph.get(a).unwrap();
        assert_eq!(object.value(FieldId::new(1)), Some(&FieldValue::Int(0)));
        assert!(object.changes().is_fully_changed());
    }

    #[test]
    fn spawn_unknown_class_fails() {
        let (mut graph, _) = graph();
        let err = graph.spawn(ClassId::new(9)).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownClass {
                class: ClassId::new(9)
            }
        );
    }

    #[test]
    fn set_records_only_real_changes() {
        let (mut graph, player) = graph();
        let entity = graph.spawn(player).unwrap();
        graph.clear_changes();

        assert!(!graph.set(entity, FieldId::new(1), FieldValue::Int(0)).unwrap());
        assert!(graph.get(entity).unwrap().changes().is_clean());

        assert!(graph.set(entity, FieldId::new(1), FieldValue::Int(50)).unwrap());
        assert_eq!(graph.get(entity).unwrap().changes().changed_count(2), 1);
    }

    #[test]
    fn set_rejects_wrong_kind_and_field() {
        let (mut graph, player) = graph();
        let entity = graph.spawn(player).unwrap();
        let err = graph
            .set(entity, FieldId::new(0), FieldValue::Int(3))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidValue { .. }));
        let err = graph
            .set(entity, FieldId::new(7), FieldValue::Int(3))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownField { .. }));
    }

    #[test]
    fn set_by_name_resolves_field() {
        let (mut graph, player) = graph();
        let entity = graph.spawn(player).unwrap();
        graph
            .set_by_name(entity, "health", FieldValue::Int(7))
            .unwrap();
        assert_eq!(
            graph.get(entity).unwrap().value(FieldId::new(1)),
            Some(&FieldValue::Int(7))
        );
        let err = graph
            .set_by_name(entity, "armor", FieldValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownFieldName { .. }));
    }

    #[test]
    fn first_snapshot_is_full_until_sent() {
        let (mut graph, player) = graph();
        graph.spawn(player).unwrap();
        let client = ClientId(1);
        graph.add_client(client);
        graph.clear_changes();

        let snapshot = graph
            .build_snapshot(client, false, SnapshotTick::new(1))
            .unwrap();
        let snapshot = single(snapshot);
        assert_eq!(snapshot.mode, SnapshotMode::Full);
        assert_eq!(snapshot.entities, 1);

        // not marked sent: still full
        let again = graph
            .build_snapshot(client, false, SnapshotTick::new(1))
            .unwrap();
        let again = single(again);
        assert_eq!(again.mode, SnapshotMode::Full);

        graph.snapshot_sent(client, SnapshotMode::Full);
        assert!(graph
            .build_snapshot(client, false, SnapshotTick::new(2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unchanged_objects_are_omitted_from_delta() {
        let (mut graph, player) = graph();
        let a = graph.spawn(player).unwrap();
        let _b = graph.spawn(player).unwrap();
        let client = ClientId(1);
        graph.add_client(client);
        graph.snapshot_sent(client, SnapshotMode::Full);
        graph.clear_changes();

        graph.set(a, FieldId::new(1), FieldValue::Int(42)).unwrap();
        let snapshot = graph
            .build_snapshot(client, false, SnapshotTick::new(3))
            .unwrap();
        let snapshot = single(snapshot);
        assert_eq!(snapshot.mode, SnapshotMode::Delta);
        let decoded = decode(&graph, &snapshot);
        assert_eq!(decoded.entities.len(), 1);
        assert_eq!(decoded.entities[0].entity, a);
        assert_eq!(
            decoded.entities[0].fields,
            vec![(FieldId::new(1), FieldValue::Int(42))]
        );
    }

    #[test]
    fn every_client_sees_changes_until_clear() {
        let (mut graph, player) = graph();
        let a = graph.spawn(player).unwrap();
        for id in 1..=3 {
            graph.add_client(ClientId(id));
            graph.snapshot_sent(ClientId(id), SnapshotMode::Full);
        }
        graph.clear_changes();
        graph.set(a, FieldId::new(1), FieldValue::Int(5)).unwrap();

        for id in 1..=3 {
            let snapshot = graph
                .build_snapshot(ClientId(id), false, SnapshotTick::new(4))
                .unwrap();
            assert_eq!(snapshot.len(), 1, "client {id} missed the change");
        }
        graph.clear_changes();
        assert!(graph
            .build_snapshot(ClientId(1), false, SnapshotTick::new(5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bad_object_is_skipped() {
        let (mut graph, player) = graph();
        let a = graph.spawn(player).unwrap();
        let b = graph.spawn(player).unwrap();
        // passes the kind check but not the 16-bit range
        graph.set(a, FieldId::new(1), FieldValue::Int(1 << 20)).unwrap();
        graph.set(b, FieldId::new(1), FieldValue::Int(9)).unwrap();

        let snapshot = graph
            .build_snapshot(ClientId(1), true, SnapshotTick::new(1))
            .unwrap();
        let snapshot = single(snapshot);
        let decoded = decode(&graph, &snapshot);
        assert_eq!(decoded.entities.len(), 1);
        assert_eq!(decoded.entities[0].entity, b);
    }

    fn decoded_ids(graph: &ReplicationGraph, parts: &[ClientSnapshot]) -> Vec<EntityId> {
        parts
            .iter()
            .flat_map(|part| decode(graph, part).entities)
            .map(|entity| entity.entity)
            .collect()
    }

    #[test]
    fn full_snapshot_past_entity_limit_is_split() {
        let (mut graph, player) = graph();
        let spawned: Vec<_> = (0..50).map(|_| graph.spawn(player).unwrap()).collect();
        let client = ClientId(1);
        graph.add_client(client);

        let parts = graph
            .build_snapshot(client, false, SnapshotTick::new(1))
            .unwrap();
        let counts: Vec<_> = parts.iter().map(|part| part.entities).collect();
        assert_eq!(counts, vec![32, 18]);
        assert!(parts[0].continued);
        assert!(!parts[1].continued);
        assert!(parts.iter().all(|part| part.mode == SnapshotMode::Full));
        assert_eq!(decoded_ids(&graph, &parts), spawned);
    }

    #[test]
    fn snapshot_past_byte_budget_is_split() {
        // 11 header bytes + 6 delta records of 26 bytes
        let budget = 11 + 6 * 26;
        let config = ReplicationConfig {
            wire_limits: wire::Limits {
                max_message_bytes: budget,
                ..wire::Limits::for_testing()
            },
            ..ReplicationConfig::for_testing()
        };
        let (mut graph, player) = graph_with(config);
        let spawned: Vec<_> = (0..20).map(|_| graph.spawn(player).unwrap()).collect();
        let client = ClientId(1);
        graph.add_client(client);
        graph.snapshot_sent(client, SnapshotMode::Full);

        let parts = graph
            .build_snapshot(client, false, SnapshotTick::new(2))
            .unwrap();
        let counts: Vec<_> = parts.iter().map(|part| part.entities).collect();
        assert_eq!(counts, vec![6, 6, 6, 2]);
        assert!(parts.iter().all(|part| part.mode == SnapshotMode::Delta));
        assert!(parts.iter().all(|part| part.bytes.len() <= budget));
        assert_eq!(
            parts.iter().filter(|part| !part.continued).count(),
            1,
            "only the last part ends the snapshot"
        );
        assert_eq!(decoded_ids(&graph, &parts), spawned);
    }

    #[test]
    fn remove_queues_delete() {
        let (mut graph, player) = graph();
        let a = graph.spawn(player).unwrap();
        graph.remove(a).unwrap();
        assert!(graph.get(a).is_none());
        assert_eq!(graph.drain_removed(), vec![a]);
        assert!(graph.drain_removed().is_empty());
        assert!(matches!(
            graph.remove(a),
            Err(GraphError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn entity_cap_enforced() {
        let (mut graph, player) = graph();
        for _ in 0..ReplicationConfig::for_testing().max_entities {
            graph.spawn(player).unwrap();
        }
        assert!(matches!(
            graph.spawn(player),
            Err(GraphError::TooManyEntities { .. })
        ));
    }

    #[test]
    fn client_removal() {
        let (mut graph, _) = graph();
        graph.add_client(ClientId(4));
        assert!(graph.has_client(ClientId(4)));
        graph.remove_client(ClientId(4));
        assert!(!graph.has_client(ClientId(4)));
    }
}
