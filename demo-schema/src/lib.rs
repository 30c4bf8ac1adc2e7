//! Demo schema for the reference simulation.
//!
//! Every replicated class is declared in [`register`], the one startup
//! routine the demo server and clients both call.

use schema::{ClassId, FieldDef, FieldId, FieldKind, Schema, SchemaRegistry, SchemaResult};

/// Units per second at full forward input.
pub const MAX_SPEED: f32 = 320.0;
pub const MAX_HEALTH: i64 = 100;

/// Field ids of the `player` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerFields {
    pub class: ClassId,
    pub origin: FieldId,
    pub velocity: FieldId,
    pub view_angles: FieldId,
    pub health: FieldId,
    pub buttons: FieldId,
    pub name: FieldId,
    pub spawn_time: FieldId,
}

/// Field ids of the `projectile` class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectileFields {
    pub class: ClassId,
    pub origin: FieldId,
    pub velocity: FieldId,
    pub owner: FieldId,
    pub expires: FieldId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoClasses {
    pub player: PlayerFields,
    pub projectile: ProjectileFields,
}

/// Registers the demo classes. Calling it again on the same registry
/// returns the same ids.
pub fn register(registry: &mut SchemaRegistry) -> SchemaResult<DemoClasses> {
    let class = registry.register_class("player")?;
    let player = PlayerFields {
        class,
        origin: registry.add_field(class, FieldDef::new("origin", FieldKind::Vec3))?,
        velocity: registry.add_field(class, FieldDef::new("velocity", FieldKind::Vec3))?,
        view_angles: registry.add_field(class, FieldDef::new("view_angles", FieldKind::Vec3))?,
        health: registry.add_field(class, FieldDef::new("health", FieldKind::int(16)))?,
        buttons: registry.add_field(class, FieldDef::new("buttons", FieldKind::uint(32)))?,
        name: registry.add_field(class, FieldDef::new("name", FieldKind::String))?,
        spawn_time: registry.add_field(class, FieldDef::new("spawn_time", FieldKind::Timestamp16))?,
    };

    let class = registry.register_class("projectile")?;
    let projectile = ProjectileFields {
        class,
        origin: registry.add_field(class, FieldDef::new("origin", FieldKind::Vec3))?,
        velocity: registry.add_field(class, FieldDef::new("velocity", FieldKind::Vec3))?,
        owner: registry.add_field(class, FieldDef::new("owner", FieldKind::uint(32)))?,
        expires: registry.add_field(class, FieldDef::new("expires", FieldKind::Timestamp16))?,
    };

    Ok(DemoClasses { player, projectile })
}

/// Builds the frozen demo schema.
pub fn demo_schema() -> SchemaResult<(Schema, DemoClasses)> {
    let mut registry = SchemaRegistry::new();
    let classes = register(&mut registry)?;
    Ok((registry.build(), classes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_is_harmless() {
        let mut registry = SchemaRegistry::new();
        let first = register(&mut registry).unwrap();
        let second = register(&mut registry).unwrap();
        assert_eq!(first, second);

        let schema = registry.build();
        assert_eq!(schema.classes().len(), 2);
        assert_eq!(schema.class(first.player.class).unwrap().field_count(), 7);
    }

    #[test]
    fn hash_is_stable_across_builds() {
        let (a, _) = demo_schema().unwrap();
        let (b, _) = demo_schema().unwrap();
        assert_eq!(a.hash(), b.hash());
    }
}
