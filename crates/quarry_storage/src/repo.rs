#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_engines::{build_catalog, Entity, Query};
use quarry_kernel_contracts::audit::{
    OperationHistory, OperationHistoryInput, ServiceHistory, ServiceHistoryId, ServiceHistoryInput,
};
use quarry_kernel_contracts::filter::{CatalogParameters, CatalogResult};

use crate::store::{InMemoryStore, StorageError, StoredEntity};

/// Typed repository interface for service/operation history persistence.
#[async_trait]
pub trait AuditHistoryRepo<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    async fn append_service_history(
        &self,
        input: ServiceHistoryInput<K>,
    ) -> Result<ServiceHistory<K>, StorageError>;

    async fn append_operation_history(
        &self,
        input: OperationHistoryInput,
    ) -> Result<OperationHistory, StorageError>;

    async fn service_history(
        &self,
        id: ServiceHistoryId,
    ) -> Result<Option<ServiceHistory<K>>, StorageError>;

    /// Sessions with at least one operation on `(table_name, entity_id)`; `changedOn` descending,
    /// then id descending.
    async fn service_histories_for_entity(
        &self,
        table_name: &str,
        entity_id: i64,
    ) -> Result<Vec<ServiceHistory<K>>, StorageError>;

    /// Operation chain of one session, id ascending.
    async fn operation_histories(
        &self,
        service_history_id: ServiceHistoryId,
    ) -> Result<Vec<OperationHistory>, StorageError>;
}

#[async_trait]
pub trait UserRepo<U, K>: Send + Sync
where
    U: Send + Sync + 'static,
    K: Send + Sync + 'static,
{
    async fn find_user(&self, id: &K) -> Result<Option<U>, StorageError>;
}

/// Type-erased entity access; use [`find_entity`] and [`run_query`] for typed reads.
#[async_trait]
pub trait EntityRepo: Send + Sync {
    async fn find_by_id(
        &self,
        table_name: &str,
        id: i64,
    ) -> Result<Option<StoredEntity>, StorageError>;

    async fn table_rows(&self, table_name: &str) -> Result<Vec<StoredEntity>, StorageError>;
}

pub async fn find_entity<E: Entity>(
    repo: &dyn EntityRepo,
    id: i64,
) -> Result<Option<Arc<E>>, StorageError> {
    match repo.find_by_id(E::shape().table_name, id).await? {
        Some(row) => Ok(Some(row.downcast::<E>()?)),
        None => Ok(None),
    }
}

pub async fn entity_rows<E: Entity + Clone>(repo: &dyn EntityRepo) -> Result<Vec<E>, StorageError> {
    repo.table_rows(E::shape().table_name)
        .await?
        .iter()
        .map(|row| row.downcast::<E>().map(|e| (*e).clone()))
        .collect()
}

/// Executes `query` against the rows of `E`'s table.
pub async fn run_query<E: Entity + Clone>(
    repo: &dyn EntityRepo,
    query: &Query<E>,
) -> Result<Vec<E>, StorageError> {
    Ok(query.execute(entity_rows::<E>(repo).await?))
}

/// Filters with `query`, then projects the survivors into a catalog.
pub async fn run_catalog<E, K, FK, FD>(
    repo: &dyn EntityRepo,
    query: &Query<E>,
    params: &CatalogParameters,
    key_selector: FK,
    display_selector: FD,
) -> Result<CatalogResult<K>, StorageError>
where
    E: Entity + Clone,
    FK: Fn(&E) -> K,
    FD: Fn(&E) -> Option<String>,
{
    let rows = run_query(repo, query).await?;
    Ok(build_catalog(rows, params, key_selector, display_selector))
}

#[async_trait]
impl<U, K> AuditHistoryRepo<K> for InMemoryStore<U, K>
where
    U: Clone + Send + Sync + 'static,
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
{
    async fn append_service_history(
        &self,
        input: ServiceHistoryInput<K>,
    ) -> Result<ServiceHistory<K>, StorageError> {
        InMemoryStore::append_service_history(self, input).await
    }

    async fn append_operation_history(
        &self,
        input: OperationHistoryInput,
    ) -> Result<OperationHistory, StorageError> {
        InMemoryStore::append_operation_history(self, input).await
    }

    async fn service_history(
        &self,
        id: ServiceHistoryId,
    ) -> Result<Option<ServiceHistory<K>>, StorageError> {
        Ok(self.service_history_by_id(id).await)
    }

    async fn service_histories_for_entity(
        &self,
        table_name: &str,
        entity_id: i64,
    ) -> Result<Vec<ServiceHistory<K>>, StorageError> {
        Ok(self.service_histories_touching(table_name, entity_id).await)
    }

    async fn operation_histories(
        &self,
        service_history_id: ServiceHistoryId,
    ) -> Result<Vec<OperationHistory>, StorageError> {
        Ok(self
            .operation_histories_for_session(service_history_id)
            .await)
    }
}

#[async_trait]
impl<U, K> UserRepo<U, K> for InMemoryStore<U, K>
where
    U: Clone + Send + Sync + 'static,
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
{
    async fn find_user(&self, id: &K) -> Result<Option<U>, StorageError> {
        Ok(self.user(id).await)
    }
}

#[async_trait]
impl<U, K> EntityRepo for InMemoryStore<U, K>
where
    U: Clone + Send + Sync + 'static,
    K: Ord + Clone + fmt::Debug + Send + Sync + 'static,
{
    async fn find_by_id(
        &self,
        table_name: &str,
        id: i64,
    ) -> Result<Option<StoredEntity>, StorageError> {
        Ok(self.entity_by_id(table_name, id).await)
    }

    async fn table_rows(&self, table_name: &str) -> Result<Vec<StoredEntity>, StorageError> {
        Ok(self.entity_rows(table_name).await)
    }
}
