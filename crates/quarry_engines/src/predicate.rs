#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use quarry_kernel_contracts::filter::Comparator;
use quarry_kernel_contracts::value::{FieldValue, ValueKind};

use crate::coerce::coerce;
use crate::error::QueryError;
use crate::fields::{Entity, FieldAccessor};
use crate::shaping::like;

/// A boolean restriction over `E`.
///
/// Carries the declarative form (`field`, `comparator`, `operand`) for storage backends that
/// translate it, and the typed accessor used for in-memory evaluation.
pub struct Predicate<E> {
    comparator: Comparator,
    operand: FieldValue,
    accessor: FieldAccessor<E>,
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self {
            comparator: self.comparator,
            operand: self.operand.clone(),
            accessor: self.accessor.clone(),
        }
    }
}

impl<E> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("field", &self.accessor.path())
            .field("comparator", &self.comparator)
            .field("operand", &self.operand)
            .finish()
    }
}

impl<E> Predicate<E> {
    pub fn field(&self) -> &str {
        self.accessor.path()
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    pub fn operand(&self) -> &FieldValue {
        &self.operand
    }

    /// `%operand%`, the pattern handed to the engine's pattern-match primitive for `Like`.
    pub fn like_pattern(&self) -> Option<String> {
        match self.comparator {
            Comparator::Like => Some(format!("%{}%", self.operand.as_text().unwrap_or(""))),
            _ => None,
        }
    }

    pub fn matches(&self, entity: &E) -> bool {
        let value = self.accessor.read(entity);
        match self.comparator {
            Comparator::Like => match (value.as_text(), self.like_pattern()) {
                (Some(text), Some(pattern)) => like(text, &pattern),
                _ => false,
            },
            Comparator::Equals => {
                if self.operand.is_null() {
                    value.is_null()
                } else {
                    value.compare(&self.operand) == Some(Ordering::Equal)
                }
            }
            Comparator::LessThan => value.compare(&self.operand) == Some(Ordering::Less),
            Comparator::LessThanOrEqual => matches!(
                value.compare(&self.operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Comparator::GreaterThan => value.compare(&self.operand) == Some(Ordering::Greater),
            Comparator::GreaterThanOrEqual => matches!(
                value.compare(&self.operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

fn supports(comparator: Comparator, kind: ValueKind, operand: &FieldValue) -> bool {
    match comparator {
        Comparator::Like => kind == ValueKind::Text,
        Comparator::Equals => true,
        Comparator::LessThan
        | Comparator::LessThanOrEqual
        | Comparator::GreaterThan
        | Comparator::GreaterThanOrEqual => kind.is_ordered() && !operand.is_null(),
    }
}

/// Builds a restriction on `field_path` of `E`.
///
/// A path that does not resolve is a [`QueryError::FieldNotFound`]. The operand is converted to
/// the field's declared kind first. `Ok(None)` means the comparator/kind combination has no
/// restriction form (e.g. `Like` on a number) and the caller leaves its query unchanged.
pub fn build_predicate<E: Entity>(
    field_path: &str,
    comparator: Comparator,
    operand: FieldValue,
) -> Result<Option<Predicate<E>>, QueryError> {
    let accessor = E::shape().fields.resolve(field_path)?;
    let kind = accessor.kind();
    let operand = match operand.kind() {
        Some(k) if k != kind => coerce(Some(&operand.to_json()), kind).map_err(|source| {
            QueryError::Coercion {
                field: field_path.to_string(),
                source,
            }
        })?,
        _ => operand,
    };
    if !supports(comparator, kind, &operand) {
        tracing::trace!(
            field = field_path,
            comparator = comparator.as_str(),
            kind = kind.name(),
            "no restriction form; query left unchanged"
        );
        return Ok(None);
    }
    Ok(Some(Predicate {
        comparator,
        operand,
        accessor: accessor.clone(),
    }))
}
