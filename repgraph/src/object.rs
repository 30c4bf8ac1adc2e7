use codec::ChangeTracker;
use schema::{ClassId, ClassSchema, FieldId, FieldValue};

/// One live replicated object: its class, current values, and change set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedObject {
    class: ClassId,
    values: Vec<FieldValue>,
    changes: ChangeTracker,
}

impl ReplicatedObject {
    /// A new object with every field at its kind's default, fully changed.
    pub(crate) fn new(class: &ClassSchema) -> Self {
        Self {
            class: class.id(),
            values: class
                .fields()
                .iter()
                .map(|field| field.kind.default_value())
                .collect(),
            changes: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> ClassId {
        self.class
    }

    /// Current values in schema order.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, field: FieldId) -> Option<&FieldValue> {
        self.values.get(field.index())
    }

    #[must_use]
    pub const fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// Stores `value` and records the change if it differs. The caller has
    /// already checked the field id and value kind.
    pub(crate) fn store(&mut self, field: FieldId, value: FieldValue) -> bool {
        let slot = &mut self.values[field.index()];
        if *slot == value {
            return false;
        }
        *slot = value;
        self.changes.mark_changed(field);
        true
    }

    pub(crate) fn mark_fully_changed(&mut self) {
        self.changes.mark_fully_changed();
    }

    pub(crate) fn clear_changes(&mut self) {
        self.changes.clear();
    }
}
