#![forbid(unsafe_code)]

use std::sync::Arc;

use quarry_engines::{Entity, Query, QueryError};
use quarry_kernel_contracts::filter::{
    CatalogParameters, CatalogResult, FilterSet, ListParameters, SummaryParameters,
};
use quarry_kernel_contracts::Validate;
use quarry_storage::repo::{run_catalog, run_query, EntityRepo};

use crate::config::AuditWiringConfig;
use crate::error::AuditError;

/// Summary, list and catalog reads over entity tables.
///
/// Each read takes a restriction hook that maps the caller's filter set onto the query, usually a
/// chain of [`Query::try_filter`] calls.
pub struct EntityReader {
    config: AuditWiringConfig,
    entities: Arc<dyn EntityRepo>,
}

impl EntityReader {
    pub fn new(config: AuditWiringConfig, entities: Arc<dyn EntityRepo>) -> Self {
        Self { config, entities }
    }

    /// Number of rows matching the filters.
    pub async fn summary<E, F>(
        &self,
        params: &SummaryParameters,
        restrict: F,
    ) -> Result<usize, AuditError>
    where
        E: Entity + Clone,
        F: FnOnce(Query<E>, &FilterSet) -> Result<Query<E>, QueryError>,
    {
        let query = restrict(Query::new(), &params.filters)?;
        Ok(run_query(self.entities.as_ref(), &query).await?.len())
    }

    pub async fn list<E, F>(
        &self,
        params: &ListParameters,
        restrict: F,
    ) -> Result<Vec<E>, AuditError>
    where
        E: Entity + Clone,
        F: FnOnce(Query<E>, &FilterSet) -> Result<Query<E>, QueryError>,
    {
        let range = params.row_range().capped(self.config.max_page_rows);
        let query = restrict(Query::new(), &params.filters)?.apply_range(range);
        Ok(run_query(self.entities.as_ref(), &query).await?)
    }

    /// Catalog with the configured default `maxResults` when the caller sends `0`.
    pub async fn catalog<E, K, F, FK, FD>(
        &self,
        params: &CatalogParameters,
        restrict: F,
        key_selector: FK,
        display_selector: FD,
    ) -> Result<CatalogResult<K>, AuditError>
    where
        E: Entity + Clone,
        F: FnOnce(Query<E>, &FilterSet) -> Result<Query<E>, QueryError>,
        FK: Fn(&E) -> K,
        FD: Fn(&E) -> Option<String>,
    {
        params.validate()?;
        let params = params
            .clone()
            .with_default_max(self.config.default_catalog_max_results);
        let query = restrict(Query::new(), &params.filters)?;
        Ok(run_catalog(
            self.entities.as_ref(),
            &query,
            &params,
            key_selector,
            display_selector,
        )
        .await?)
    }
}
