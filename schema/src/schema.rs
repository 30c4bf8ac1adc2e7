//! Class registration and the frozen replication schema.

use std::collections::HashMap;

use crate::error::{SchemaError, SchemaResult};
use crate::hash::schema_hash;
use crate::{ClassId, FieldId, FieldKind, MAX_FIELDS_PER_CLASS};

/// A replicated field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One class: its id, name, and fields in registration order.
///
/// A field's position in `fields` is its [`FieldId`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClassSchema {
    id: ClassId,
    name: String,
    fields: Vec<FieldDef>,
    #[cfg_attr(feature = "serde", serde(skip))]
    by_name: HashMap<String, FieldId>,
}

impl ClassSchema {
    fn new(id: ClassId, name: String) -> Self {
        Self {
            id,
            name,
            fields: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ClassId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in registration (and full snapshot) order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.get(id.index())
    }

    /// Resolves a field name to its id in O(1).
    #[must_use]
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// All field ids in schema order.
    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(|index| FieldId::new(index as u8))
    }
}

/// Mutable registry used by the startup routine to declare classes.
///
/// Registration is idempotent: declaring the same class or the same field
/// twice returns the id handed out the first time.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    classes: Vec<ClassSchema>,
    by_name: HashMap<String, ClassId>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, or returns the id it already has.
    pub fn register_class(&mut self, name: &str) -> SchemaResult<ClassId> {
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }
        let raw = u16::try_from(self.classes.len()).map_err(|_| SchemaError::TooManyClasses {
            count: self.classes.len() + 1,
        })?;
        let id = ClassId::new(raw);
        self.classes.push(ClassSchema::new(id, name.to_owned()));
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Appends a field to a class and returns its id.
    ///
    /// Re-adding a field with the same name and kind returns the existing id.
    pub fn add_field(&mut self, class: ClassId, field: FieldDef) -> SchemaResult<FieldId> {
        if !field.kind.has_valid_width() {
            return Err(SchemaError::InvalidBitWidth { kind: field.kind });
        }
        let schema = self
            .classes
            .get_mut(usize::from(class.get()))
            .ok_or(SchemaError::UnknownClass { class })?;

        if let Some(existing) = schema.by_name.get(&field.name).copied() {
            let existing_kind = schema.fields[existing.index()].kind;
            if existing_kind == field.kind {
                return Ok(existing);
            }
            return Err(SchemaError::ConflictingField {
                class,
                name: field.name,
                existing: existing_kind,
                requested: field.kind,
            });
        }

        if schema.fields.len() >= MAX_FIELDS_PER_CLASS {
            return Err(SchemaError::TooManyFields {
                class,
                count: schema.fields.len() + 1,
            });
        }
        let id = FieldId::new(schema.fields.len() as u8);
        schema.by_name.insert(field.name.clone(), id);
        schema.fields.push(field);
        Ok(id)
    }

    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Freezes the registry into an immutable schema.
    #[must_use]
    pub fn build(self) -> Schema {
        let hash = schema_hash(&self.classes);
        Schema {
            classes: self.classes,
            by_name: self.by_name,
            hash,
        }
    }
}

/// The frozen schema shared by every component for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Schema {
    classes: Vec<ClassSchema>,
    #[cfg_attr(feature = "serde", serde(skip))]
    by_name: HashMap<String, ClassId>,
    hash: u64,
}

impl Schema {
    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassSchema> {
        self.classes.get(usize::from(id.get()))
    }

    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<&ClassSchema> {
        self.class_id(name).and_then(|id| self.class(id))
    }

    #[must_use]
    pub fn classes(&self) -> &[ClassSchema] {
        &self.classes
    }

    /// Deterministic hash exchanged at connect time to detect mismatched builds.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_class_is_idempotent() {
        let mut registry = SchemaRegistry::new();
        let a = registry.register_class("player").unwrap();
        let b = registry.register_class("crate").unwrap();
        let again = registry.register_class("player").unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(registry.class_id("crate"), Some(b));
    }

    #[test]
    fn fields_keep_registration_order() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("player").unwrap();
        let origin = registry
            .add_field(class, FieldDef::new("origin", FieldKind::Vec3))
            .unwrap();
        let health = registry
            .add_field(class, FieldDef::new("health", FieldKind::int(16)))
            .unwrap();
        assert_eq!(origin.get(), 0);
        assert_eq!(health.get(), 1);

        let schema = registry.build();
        let player = schema.class(class).unwrap();
        let names: Vec<_> = player.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["origin", "health"]);
        assert_eq!(player.field_id("health"), Some(health));
        assert_eq!(player.field_ids().count(), 2);
    }

    #[test]
    fn re_adding_same_field_returns_same_id() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("player").unwrap();
        let first = registry
            .add_field(class, FieldDef::new("tickbase", FieldKind::int(32)))
            .unwrap();
        let second = registry
            .add_field(class, FieldDef::new("tickbase", FieldKind::int(32)))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.build().class(class).unwrap().field_count(), 1);
    }

    #[test]
    fn conflicting_field_is_rejected() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("player").unwrap();
        registry
            .add_field(class, FieldDef::new("tickbase", FieldKind::int(32)))
            .unwrap();
        let err = registry
            .add_field(class, FieldDef::new("tickbase", FieldKind::uint(32)))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingField { .. }));
    }

    #[test]
    fn more_than_255_fields_is_a_configuration_error() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("wide").unwrap();
        for i in 0..255 {
            registry
                .add_field(class, FieldDef::new(format!("f{i}"), FieldKind::Bool))
                .unwrap();
        }
        let err = registry
            .add_field(class, FieldDef::new("overflow", FieldKind::Bool))
            .unwrap_err();
        assert_eq!(err, SchemaError::TooManyFields { class, count: 256 });
    }

    #[test]
    fn unknown_class_is_rejected() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .add_field(ClassId::new(9), FieldDef::new("x", FieldKind::Bool))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownClass {
                class: ClassId::new(9)
            }
        );
    }

    #[test]
    fn invalid_width_is_rejected() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("bad").unwrap();
        let err = registry
            .add_field(class, FieldDef::new("x", FieldKind::int(12)))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBitWidth { .. }));
    }

    #[test]
    fn schema_lookup_by_name() {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("door").unwrap();
        let schema = registry.build();
        assert_eq!(schema.class_by_name("door").unwrap().id(), class);
        assert!(schema.class_by_name("window").is_none());
        assert!(schema.class(ClassId::new(5)).is_none());
    }
}
