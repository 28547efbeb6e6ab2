#![forbid(unsafe_code)]

use quarry_kernel_contracts::audit::{OperationHistoryInput, OperationType, ServiceHistory};
use quarry_kernel_contracts::ContractViolation;
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::fields::Entity;

/// Original/current value of one scalar property. `Null` reads as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub original: Option<Value>,
    pub current: Option<Value>,
}

impl PropertyChange {
    pub fn new(name: impl Into<String>, original: Option<Value>, current: Option<Value>) -> Self {
        Self {
            name: name.into(),
            original,
            current,
        }
    }

    fn original_value(&self) -> Option<&Value> {
        self.original.as_ref().filter(|v| !v.is_null())
    }

    fn current_value(&self) -> Option<&Value> {
        self.current.as_ref().filter(|v| !v.is_null())
    }

    /// One side present and the other absent, or both present and unequal.
    pub fn has_value_modified(&self) -> bool {
        match (self.original_value(), self.current_value()) {
            (None, None) => false,
            (Some(a), Some(b)) => a != b,
            _ => true,
        }
    }
}

/// Before/after snapshot of one tracked entity mutation.
#[derive(Debug)]
pub struct EntityChange<'a, E> {
    pub kind: OperationType,
    pub entity: &'a E,
    pub properties: Vec<PropertyChange>,
}

impl<'a, E: Entity> EntityChange<'a, E> {
    pub fn new(kind: OperationType, entity: &'a E, properties: Vec<PropertyChange>) -> Self {
        Self {
            kind,
            entity,
            properties,
        }
    }

    /// Snapshots the top-level scalar fields of `before` and `after`.
    ///
    /// `Deleted` reports against `before`; `Added` and `Modified` against `after`.
    pub fn capture(
        kind: OperationType,
        before: Option<&'a E>,
        after: Option<&'a E>,
    ) -> Result<Self, QueryError> {
        let entity = match kind {
            OperationType::Deleted => before,
            OperationType::Added | OperationType::Modified => after,
        }
        .ok_or(ContractViolation::InvalidValue {
            field: "entity_change",
            reason: "snapshot for the reported entity is missing",
        })?;
        let properties = E::shape()
            .fields
            .scalar_fields()
            .map(|accessor| {
                PropertyChange::new(
                    accessor.path(),
                    before.map(|b| accessor.read(b).to_json()),
                    after.map(|a| accessor.read(a).to_json()),
                )
            })
            .collect();
        Ok(Self {
            kind,
            entity,
            properties,
        })
    }
}

/// Builds the operation-history row for `change` under `session`.
///
/// Only modified properties are written; the side without a value is written as `null`.
pub fn to_operation_history<E: Entity, K>(
    change: &EntityChange<'_, E>,
    session: &ServiceHistory<K>,
) -> Result<OperationHistoryInput, QueryError> {
    let shape = E::shape();
    let mut old_values = Map::new();
    let mut new_values = Map::new();
    for property in change.properties.iter().filter(|p| p.has_value_modified()) {
        old_values.insert(
            property.name.clone(),
            property.original_value().cloned().unwrap_or(Value::Null),
        );
        new_values.insert(
            property.name.clone(),
            property.current_value().cloned().unwrap_or(Value::Null),
        );
    }
    let input = OperationHistoryInput::v1(
        session.id,
        shape.table_name.to_string(),
        shape.entity_name.to_string(),
        shape.identity_of(change.entity),
        change.kind.clone(),
        Value::Object(old_values).to_string(),
        Value::Object(new_values).to_string(),
    )?;
    Ok(input)
}
