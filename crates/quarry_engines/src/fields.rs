#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use quarry_kernel_contracts::value::{FieldValue, ValueKind};

use crate::error::QueryError;

type Getter<E> = Arc<dyn Fn(&E) -> FieldValue + Send + Sync>;

/// Typed read access to one (possibly nested) field of `E`.
pub struct FieldAccessor<E> {
    path: String,
    kind: ValueKind,
    get: Getter<E>,
}

impl<E> Clone for FieldAccessor<E> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind,
            get: Arc::clone(&self.get),
        }
    }
}

impl<E> fmt::Debug for FieldAccessor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<E> FieldAccessor<E> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn read(&self, entity: &E) -> FieldValue {
        (self.get)(entity)
    }
}

/// Registration-time field table for an entity type.
///
/// Nested tables are flattened into dotted paths when registered, so lookups never walk
/// live values. Intermediate segments are remembered with their type name so a bad path
/// reports the type the missing segment was looked up on.
pub struct FieldTable<E> {
    type_name: &'static str,
    leaves: BTreeMap<String, FieldAccessor<E>>,
    nested: BTreeMap<String, &'static str>,
}

impl<E: 'static> FieldTable<E> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            leaves: BTreeMap::new(),
            nested: BTreeMap::new(),
        }
    }

    pub fn field<F>(mut self, name: &str, kind: ValueKind, get: F) -> Self
    where
        F: Fn(&E) -> FieldValue + Send + Sync + 'static,
    {
        self.leaves.insert(
            name.to_string(),
            FieldAccessor {
                path: name.to_string(),
                kind,
                get: Arc::new(get),
            },
        );
        self
    }

    /// Registers every field of `child` under `name.`. A `None` projection reads as `Null`.
    pub fn nested<C, P>(mut self, name: &str, project: P, child: &FieldTable<C>) -> Self
    where
        C: 'static,
        P: for<'a> Fn(&'a E) -> Option<&'a C> + Send + Sync + 'static,
    {
        let project = Arc::new(project);
        self.nested.insert(name.to_string(), child.type_name);
        for (prefix, type_name) in &child.nested {
            self.nested.insert(format!("{name}.{prefix}"), *type_name);
        }
        for (child_path, accessor) in &child.leaves {
            let path = format!("{name}.{child_path}");
            let project = Arc::clone(&project);
            let inner = accessor.clone();
            let get: Getter<E> = Arc::new(move |e: &E| match (*project)(e) {
                Some(c) => inner.read(c),
                None => FieldValue::Null,
            });
            self.leaves.insert(
                path.clone(),
                FieldAccessor {
                    path,
                    kind: accessor.kind,
                    get,
                },
            );
        }
        self
    }
}

impl<E> FieldTable<E> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Resolves a dotted path segment by segment.
    pub fn resolve(&self, path: &str) -> Result<&FieldAccessor<E>, QueryError> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut owner = self.type_name;
        let mut prefix = String::with_capacity(path.len());
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if i + 1 == segments.len() {
                return self
                    .leaves
                    .get(&prefix)
                    .ok_or_else(|| QueryError::FieldNotFound {
                        type_name: owner,
                        field: segment.to_string(),
                    });
            }
            match self.nested.get(&prefix) {
                Some(type_name) => owner = *type_name,
                None => {
                    return Err(QueryError::FieldNotFound {
                        type_name: owner,
                        field: segment.to_string(),
                    })
                }
            }
        }
        Err(QueryError::FieldNotFound {
            type_name: owner,
            field: path.to_string(),
        })
    }

    /// Top-level scalar fields, in name order.
    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldAccessor<E>> {
        self.leaves.values().filter(|a| !a.path.contains('.'))
    }
}

/// Storage shape of an entity type.
pub struct EntityShape<E> {
    pub table_name: &'static str,
    pub entity_name: &'static str,
    pub fields: FieldTable<E>,
    identity: Option<fn(&E) -> i64>,
}

impl<E> EntityShape<E> {
    pub fn new(table_name: &'static str, entity_name: &'static str, fields: FieldTable<E>) -> Self {
        Self {
            table_name,
            entity_name,
            fields,
            identity: None,
        }
    }

    /// Marks the type as part of the audited-entity family with a numeric identity.
    pub fn with_identity(mut self, identity: fn(&E) -> i64) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn identity_of(&self, entity: &E) -> Option<i64> {
        self.identity.map(|id| id(entity))
    }
}

/// An entity type with a shape built once and shared for the process lifetime.
pub trait Entity: Sized + Send + Sync + 'static {
    fn shape() -> &'static EntityShape<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Address {
        city: String,
    }

    struct Customer {
        name: String,
        address: Option<Address>,
    }

    struct Order {
        total: i64,
        customer: Customer,
    }

    fn order_table() -> FieldTable<Order> {
        let address = FieldTable::<Address>::new("Address").field("city", ValueKind::Text, |a| {
            FieldValue::text(a.city.clone())
        });
        let customer = FieldTable::<Customer>::new("Customer")
            .field("name", ValueKind::Text, |c| FieldValue::text(c.name.clone()))
            .nested("address", |c: &Customer| c.address.as_ref(), &address);
        FieldTable::<Order>::new("Order")
            .field("total", ValueKind::I64, |o| FieldValue::I64(o.total))
            .nested("customer", |o: &Order| Some(&o.customer), &customer)
    }

    fn order(city: Option<&str>) -> Order {
        Order {
            total: 10,
            customer: Customer {
                name: "Ada".to_string(),
                address: city.map(|c| Address {
                    city: c.to_string(),
                }),
            },
        }
    }

    #[test]
    fn resolves_nested_paths() {
        let table = order_table();
        let accessor = table.resolve("customer.address.city").unwrap();
        assert_eq!(accessor.kind(), ValueKind::Text);
        assert_eq!(accessor.read(&order(Some("Oslo"))), FieldValue::text("Oslo"));
        assert_eq!(accessor.read(&order(None)), FieldValue::Null);
    }

    #[test]
    fn missing_segment_reports_owning_type() {
        let table = order_table();
        match table.resolve("customer.phone").unwrap_err() {
            QueryError::FieldNotFound { type_name, field } => {
                assert_eq!(type_name, "Customer");
                assert_eq!(field, "phone");
            }
            other => panic!("unexpected error {other:?}"),
        }
        match table.resolve("vendor.name").unwrap_err() {
            QueryError::FieldNotFound { type_name, field } => {
                assert_eq!(type_name, "Order");
                assert_eq!(field, "vendor");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn nested_node_is_not_a_filterable_leaf() {
        assert!(order_table().resolve("customer").is_err());
        assert!(order_table().resolve("").is_err());
    }

    #[test]
    fn scalar_fields_skip_nested_paths() {
        let table = order_table();
        let names: Vec<&str> = table.scalar_fields().map(|a| a.path()).collect();
        assert_eq!(names, vec!["total"]);
    }
}
