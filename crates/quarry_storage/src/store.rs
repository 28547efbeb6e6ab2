#![forbid(unsafe_code)]

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use quarry_engines::Entity;
use quarry_kernel_contracts::audit::{
    OperationHistory, OperationHistoryId, OperationHistoryInput, ServiceHistory,
    ServiceHistoryId, ServiceHistoryInput,
};
use quarry_kernel_contracts::ContractViolation;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

pub const SERVICE_HISTORIES_TABLE: &str = "service_histories";
pub const OPERATION_HISTORIES_TABLE: &str = "operation_histories";
pub const USERS_TABLE: &str = "users";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key on {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("{table} is append-only")]
    AppendOnlyViolation { table: &'static str },
    #[error("row in {table} is not of the requested entity type")]
    TypeMismatch { table: String },
    #[error("backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// A persisted entity row, type-erased so one store can hold every entity table.
#[derive(Clone)]
pub struct StoredEntity {
    pub id: Option<i64>,
    row: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for StoredEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredEntity").field("id", &self.id).finish()
    }
}

impl StoredEntity {
    pub fn new<E: Entity>(entity: E) -> Self {
        Self {
            id: E::shape().identity_of(&entity),
            row: Arc::new(entity),
        }
    }

    pub fn downcast<E: Entity>(&self) -> Result<Arc<E>, StorageError> {
        Arc::clone(&self.row)
            .downcast::<E>()
            .map_err(|_| StorageError::TypeMismatch {
                table: E::shape().table_name.to_string(),
            })
    }
}

struct StoreState<U, K> {
    service_histories: Vec<ServiceHistory<K>>,
    operation_histories: Vec<OperationHistory>,
    next_service_history_id: u64,
    next_operation_history_id: u64,
    entities: BTreeMap<String, Vec<StoredEntity>>,
    users: BTreeMap<K, U>,
}

/// In-memory audit store: append-only history ledgers plus entity and user tables.
///
/// Service and operation histories are never updated in place; `attempt_overwrite_*` exists so
/// callers can prove the ledger refuses it.
pub struct InMemoryStore<U, K> {
    state: RwLock<StoreState<U, K>>,
}

impl<U, K> Default for InMemoryStore<U, K> {
    fn default() -> Self {
        Self {
            state: RwLock::new(StoreState {
                service_histories: Vec::new(),
                operation_histories: Vec::new(),
                next_service_history_id: 1,
                next_operation_history_id: 1,
                entities: BTreeMap::new(),
                users: BTreeMap::new(),
            }),
        }
    }
}

impl<U, K> InMemoryStore<U, K>
where
    U: Clone + Send + Sync + 'static,
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
{
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, id: K, user: U) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                table: USERS_TABLE,
                key: format!("{id:?}"),
            });
        }
        state.users.insert(id, user);
        Ok(())
    }

    pub async fn user(&self, id: &K) -> Option<U> {
        self.state.read().await.users.get(id).cloned()
    }

    /// Persists `entity` into its shape's table. Identified rows must be unique per table.
    pub async fn insert_entity<E: Entity>(&self, entity: E) -> Result<(), StorageError> {
        let table = E::shape().table_name;
        let stored = StoredEntity::new(entity);
        let mut state = self.state.write().await;
        let rows = state.entities.entry(table.to_string()).or_default();
        if let Some(id) = stored.id {
            if rows.iter().any(|r| r.id == Some(id)) {
                return Err(StorageError::DuplicateKey {
                    table: E::shape().table_name,
                    key: id.to_string(),
                });
            }
        }
        rows.push(stored);
        Ok(())
    }

    pub async fn entity_by_id(&self, table_name: &str, id: i64) -> Option<StoredEntity> {
        self.state
            .read()
            .await
            .entities
            .get(table_name)
            .and_then(|rows| rows.iter().find(|r| r.id == Some(id)).cloned())
    }

    pub async fn entity_rows(&self, table_name: &str) -> Vec<StoredEntity> {
        self.state
            .read()
            .await
            .entities
            .get(table_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn append_service_history(
        &self,
        input: ServiceHistoryInput<K>,
    ) -> Result<ServiceHistory<K>, StorageError> {
        let mut state = self.state.write().await;
        if let Some(user_id) = &input.changed_by {
            if !state.users.contains_key(user_id) {
                return Err(StorageError::ForeignKeyViolation {
                    table: SERVICE_HISTORIES_TABLE,
                    key: format!("changed_by={user_id:?}"),
                });
            }
        }
        let id = ServiceHistoryId(state.next_service_history_id);
        let row = ServiceHistory::from_input_v1(id, input)?;
        state.next_service_history_id = state.next_service_history_id.saturating_add(1);
        state.service_histories.push(row.clone());
        debug!(service_history_id = id.0, name = %row.name, "service history appended");
        Ok(row)
    }

    pub async fn append_operation_history(
        &self,
        input: OperationHistoryInput,
    ) -> Result<OperationHistory, StorageError> {
        let mut state = self.state.write().await;
        if !state
            .service_histories
            .iter()
            .any(|h| h.id == input.service_history_id)
        {
            return Err(StorageError::ForeignKeyViolation {
                table: OPERATION_HISTORIES_TABLE,
                key: format!("service_history_id={}", input.service_history_id.0),
            });
        }
        let id = OperationHistoryId(state.next_operation_history_id);
        let row = OperationHistory::from_input_v1(id, input)?;
        state.next_operation_history_id = state.next_operation_history_id.saturating_add(1);
        state.operation_histories.push(row.clone());
        debug!(
            operation_history_id = id.0,
            table = %row.table_name,
            operation = row.operation_type.as_str(),
            "operation history appended"
        );
        Ok(row)
    }

    pub async fn service_history_rows(&self) -> Vec<ServiceHistory<K>> {
        self.state.read().await.service_histories.clone()
    }

    pub async fn operation_history_rows(&self) -> Vec<OperationHistory> {
        self.state.read().await.operation_histories.clone()
    }

    pub async fn service_history_by_id(&self, id: ServiceHistoryId) -> Option<ServiceHistory<K>> {
        self.state
            .read()
            .await
            .service_histories
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    /// Sessions that touched `(table_name, entity_id)`, newest first.
    pub async fn service_histories_touching(
        &self,
        table_name: &str,
        entity_id: i64,
    ) -> Vec<ServiceHistory<K>> {
        let state = self.state.read().await;
        let session_ids: BTreeSet<ServiceHistoryId> = state
            .operation_histories
            .iter()
            .filter(|o| o.table_name == table_name && o.entity_id == Some(entity_id))
            .map(|o| o.service_history_id)
            .collect();
        let mut rows: Vec<ServiceHistory<K>> = state
            .service_histories
            .iter()
            .filter(|h| session_ids.contains(&h.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.changed_on
                .cmp(&a.changed_on)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows
    }

    /// Operation chain of one session, in append order.
    pub async fn operation_histories_for_session(
        &self,
        service_history_id: ServiceHistoryId,
    ) -> Vec<OperationHistory> {
        let mut rows: Vec<OperationHistory> = self
            .state
            .read()
            .await
            .operation_histories
            .iter()
            .filter(|o| o.service_history_id == service_history_id)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.id);
        rows
    }

    pub fn attempt_overwrite_service_history(
        &self,
        _id: ServiceHistoryId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: SERVICE_HISTORIES_TABLE,
        })
    }

    pub fn attempt_overwrite_operation_history(
        &self,
        _id: OperationHistoryId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: OPERATION_HISTORIES_TABLE,
        })
    }
}
