//! Deterministic schema hashing.

use blake3::Hasher;

use crate::{ClassSchema, FieldKind};

/// Computes a deterministic hash over class ids, names, and field layouts.
///
/// Any change to field order, field width, or class id assignment changes the hash.
#[must_use]
pub fn schema_hash(classes: &[ClassSchema]) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, classes.len() as u32);

    for class in classes {
        write_u16(&mut hasher, class.id().get());
        write_str(&mut hasher, class.name());
        write_u32(&mut hasher, class.field_count() as u32);

        for field in class.fields() {
            write_str(&mut hasher, &field.name);
            write_kind(&mut hasher, field.kind);
        }
    }

    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(out)
}

fn write_kind(hasher: &mut Hasher, kind: FieldKind) {
    match kind {
        FieldKind::Bool => write_u8(hasher, 0),
        FieldKind::Int { bits } => {
            write_u8(hasher, 1);
            write_u8(hasher, bits);
        }
        FieldKind::UInt { bits } => {
            write_u8(hasher, 2);
            write_u8(hasher, bits);
        }
        FieldKind::Float { bits } => {
            write_u8(hasher, 3);
            write_u8(hasher, bits);
        }
        FieldKind::String => write_u8(hasher, 4),
        FieldKind::Vec2 => write_u8(hasher, 5),
        FieldKind::Vec3 => write_u8(hasher, 6),
        FieldKind::Vec4 => write_u8(hasher, 7),
        FieldKind::Timestamp16 => write_u8(hasher, 8),
    }
}

fn write_str(hasher: &mut Hasher, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use crate::{FieldDef, FieldKind, SchemaRegistry};

    fn registry(fields: &[(&str, FieldKind)]) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        let class = registry.register_class("player").unwrap();
        for (name, kind) in fields {
            registry
                .add_field(class, FieldDef::new(*name, *kind))
                .unwrap();
        }
        registry
    }

    #[test]
    fn schema_hash_is_stable() {
        let fields = [("origin", FieldKind::Vec3), ("health", FieldKind::int(16))];
        let a = registry(&fields).build();
        let b = registry(&fields).build();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn schema_hash_changes_with_field_order() {
        let a = registry(&[("origin", FieldKind::Vec3), ("health", FieldKind::int(16))]).build();
        let b = registry(&[("health", FieldKind::int(16)), ("origin", FieldKind::Vec3)]).build();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn schema_hash_changes_with_field_width() {
        let a = registry(&[("health", FieldKind::int(16))]).build();
        let b = registry(&[("health", FieldKind::int(32))]).build();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn schema_hash_changes_with_class_order() {
        let mut first = SchemaRegistry::new();
        first.register_class("a").unwrap();
        first.register_class("b").unwrap();
        let mut second = SchemaRegistry::new();
        second.register_class("b").unwrap();
        second.register_class("a").unwrap();
        assert_ne!(first.build().hash(), second.build().hash());
    }
}
