//! Replication schema and field codec for the tickwire protocol.
//!
//! This crate defines how replicated state is described and encoded:
//! - Field kinds and values, and the codec that writes them to a byte cursor
//! - Per-class ordered field lists with stable one-byte field ids
//! - Deterministic schema hashing for build compatibility checks
//!
//! # Design Principles
//!
//! - **Explicit registration** - Classes and fields are declared by builder calls from one
//!   startup routine. Registering twice is harmless.
//! - **No implicit truncation** - Values outside a field's declared width are rejected.
//! - **Deterministic hashing** - The schema hash is stable given the same definition.
//!
//! # Example
//!
//! ```
//! use schema::{FieldDef, FieldKind, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! let player = registry.register_class("player").unwrap();
//! registry.add_field(player, FieldDef::new("origin", FieldKind::Vec3)).unwrap();
//! let schema = registry.build();
//!
//! assert_eq!(schema.class(player).unwrap().field_count(), 1);
//! ```

mod error;
mod field;
mod hash;
mod schema;

pub use error::{FieldError, FieldResult, SchemaError, SchemaResult};
pub use field::{decode_value, encode_value, FieldKind, FieldValue};
pub use hash::schema_hash;
pub use schema::{ClassSchema, FieldDef, Schema, SchemaRegistry};

/// Maximum number of fields in one class (field ids are one byte on the wire).
pub const MAX_FIELDS_PER_CLASS: usize = 255;

/// A stable class identifier, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassId(u16);

impl ClassId {
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// A field id within a class: its position in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldId(u8);

impl FieldId {
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Index into the class's field list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn public_api_exports() {
        let _ = FieldKind::Vec3;
        let _ = FieldValue::Bool(true);
        let _ = SchemaRegistry::new().build();
        let _: SchemaResult<()> = Ok(());
        let _: FieldResult<()> = Ok(());
    }

    #[test]
    fn id_sizes_match_wire_format() {
        assert_eq!(size_of::<ClassId>(), 2);
        assert_eq!(size_of::<FieldId>(), 1);
    }

    #[test]
    fn field_id_index() {
        assert_eq!(FieldId::new(7).index(), 7);
        assert_eq!(ClassId::new(300).get(), 300);
    }
}
