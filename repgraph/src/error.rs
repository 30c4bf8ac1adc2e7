use std::fmt;

use codec::EntityId;
use schema::{ClassId, FieldError, FieldId};

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors from mutating the live object registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownEntity { entity: EntityId },
    UnknownClass { class: ClassId },
    UnknownField { class: ClassId, field: FieldId },
    UnknownFieldName { class: ClassId, name: String },
    /// The value does not fit the field's kind.
    InvalidValue {
        entity: EntityId,
        field: FieldId,
        source: FieldError,
    },
    TooManyEntities { limit: usize },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEntity { entity } => write!(f, "unknown entity {}", entity.raw()),
            Self::UnknownClass { class } => write!(f, "unknown class {}", class.get()),
            Self::UnknownField { class, field } => {
                write!(f, "class {} has no field {}", class.get(), field.get())
            }
            Self::UnknownFieldName { class, name } => {
                write!(f, "class {} has no field named {name:?}", class.get())
            }
            Self::InvalidValue {
                entity,
                field,
                source,
            } => {
                write!(
                    f,
                    "invalid value for field {} of entity {}: {source}",
                    field.get(),
                    entity.raw()
                )
            }
            Self::TooManyEntities { limit } => write!(f, "entity limit {limit} reached"),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidValue { source, .. } => Some(source),
            _ => None,
        }
    }
}
