#![forbid(unsafe_code)]

use std::sync::Arc;

use quarry_engines::{Entity, Query};
use quarry_kernel_contracts::audit::{
    OperationHistoryListItem, ServiceHistoryId, ServiceHistoryListItem,
};
use quarry_kernel_contracts::filter::ListParameters;
use quarry_storage::repo::{find_entity, AuditHistoryRepo, EntityRepo};
use tracing::debug;

use crate::config::AuditWiringConfig;
use crate::error::AuditError;

/// Read side of the audit trail.
pub struct HistoryReader<K> {
    config: AuditWiringConfig,
    histories: Arc<dyn AuditHistoryRepo<K>>,
    entities: Arc<dyn EntityRepo>,
}

impl<K> HistoryReader<K>
where
    K: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: AuditWiringConfig,
        histories: Arc<dyn AuditHistoryRepo<K>>,
        entities: Arc<dyn EntityRepo>,
    ) -> Self {
        Self {
            config,
            histories,
            entities,
        }
    }

    /// Sessions that touched entity `entity_id` of `E`, newest first, restricted to the row range.
    pub async fn list_service_histories_for_entity<E: Entity>(
        &self,
        entity_id: i64,
        params: &ListParameters,
    ) -> Result<Vec<ServiceHistoryListItem>, AuditError> {
        let rows = self
            .histories
            .service_histories_for_entity(E::shape().table_name, entity_id)
            .await?;
        let range = params.row_range().capped(self.config.max_page_rows);
        Ok(Query::new()
            .apply_range(range)
            .execute(rows)
            .into_iter()
            .map(ServiceHistoryListItem::from)
            .collect())
    }

    /// Operation chain of session `service_history_id`, provided it touched entity `entity_id`.
    ///
    /// A missing entity or session is an error. A session that never touched the entity yields
    /// an empty list.
    pub async fn list_operation_histories_for_entity<E: Entity>(
        &self,
        entity_id: i64,
        service_history_id: ServiceHistoryId,
        params: &ListParameters,
    ) -> Result<Vec<OperationHistoryListItem>, AuditError> {
        let shape = E::shape();
        if find_entity::<E>(self.entities.as_ref(), entity_id)
            .await?
            .is_none()
        {
            return Err(AuditError::EntityNotFound {
                type_name: shape.entity_name,
                id: entity_id,
            });
        }
        let session_exists = service_history_id.0 > 0
            && self
                .histories
                .service_history(service_history_id)
                .await?
                .is_some();
        if !session_exists {
            return Err(AuditError::ServiceHistoryNotFound {
                id: service_history_id.0,
            });
        }

        let rows = self.histories.operation_histories(service_history_id).await?;
        let touched = rows
            .iter()
            .any(|o| o.table_name == shape.table_name && o.entity_id == Some(entity_id));
        if !touched {
            debug!(
                table = shape.table_name,
                entity_id,
                service_history_id = service_history_id.0,
                "no operation history for entity in session"
            );
            return Ok(Vec::new());
        }

        let range = params.row_range().capped(self.config.max_page_rows);
        Ok(Query::new()
            .apply_range(range)
            .execute(rows)
            .into_iter()
            .map(OperationHistoryListItem::from)
            .collect())
    }
}
