#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::Utc;
use quarry_engines::{to_operation_history, Entity, EntityChange};
use quarry_kernel_contracts::audit::{
    ActionContext, AuditUser, OperationHistory, ServiceHistory, ServiceHistoryInput,
};
use quarry_kernel_contracts::Validate;
use quarry_storage::repo::{AuditHistoryRepo, EntityRepo, UserRepo};
use tracing::{debug, info, warn};

use crate::cancel::{run_cancellable, CancelSignal};
use crate::config::AuditWiringConfig;
use crate::error::AuditError;
use crate::history::HistoryReader;
use crate::listing::EntityReader;
use crate::permission::PermissionCheck;
use crate::user::CurrentUserProvider;

#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome<T> {
    NotInvokedDisabled,
    Recorded(T),
}

impl<T> AuditOutcome<T> {
    pub fn recorded(self) -> Option<T> {
        match self {
            AuditOutcome::Recorded(v) => Some(v),
            AuditOutcome::NotInvokedDisabled => None,
        }
    }
}

/// Audit state of one service invocation: no session, then exactly one open session.
///
/// A tracker is never shared between invocations; [`AuditServiceFactory::scoped`] hands out a
/// fresh one per call.
pub struct AuditSessionTracker<U, K> {
    config: AuditWiringConfig,
    histories: Arc<dyn AuditHistoryRepo<K>>,
    users: Arc<dyn UserRepo<U, K>>,
    current_user: Arc<dyn CurrentUserProvider<K>>,
    permissions: Arc<dyn PermissionCheck>,
    current: Option<ServiceHistory<K>>,
}

impl<U, K> AuditSessionTracker<U, K>
where
    U: AuditUser<K> + Send + Sync + 'static,
    K: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: AuditWiringConfig,
        histories: Arc<dyn AuditHistoryRepo<K>>,
        users: Arc<dyn UserRepo<U, K>>,
        current_user: Arc<dyn CurrentUserProvider<K>>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            config,
            histories,
            users,
            current_user,
            permissions,
            current: None,
        }
    }

    pub fn current_session(&self) -> Option<&ServiceHistory<K>> {
        self.current.as_ref()
    }

    /// Opens the invocation's service history, named `"<service>\<method>"` after `action`.
    ///
    /// The permission collaborator's denial propagates unchanged. The session only becomes
    /// current once the insert has committed, so a cancelled open leaves the tracker empty.
    pub async fn begin_session(
        &mut self,
        action: Option<&ActionContext>,
        cancel: &CancelSignal,
    ) -> Result<AuditOutcome<ServiceHistory<K>>, AuditError> {
        if !self.config.audit_enabled {
            return Ok(AuditOutcome::NotInvokedDisabled);
        }
        let Some(action) = action else {
            warn!("audit session requested without an action context");
            return Err(AuditError::NoActionContext);
        };
        action.validate()?;
        if let Some(open) = &self.current {
            warn!(
                service_history_id = open.id.0,
                name = %open.name,
                "audit session already open for this invocation"
            );
            return Err(AuditError::SessionAlreadyOpen { id: open.id.0 });
        }
        if let Err(denied) = self
            .permissions
            .validate_current_user_has_permission(action)
            .await
        {
            warn!(action = %denied.action, reason = %denied.reason, "audit session denied");
            return Err(denied.into());
        }

        let changed_by = self.current_user.current_user_id();
        let changed_by_name = match &changed_by {
            Some(id) => self
                .users
                .find_user(id)
                .await?
                .map(|u| u.display_name().to_string()),
            None => None,
        };
        let input = ServiceHistoryInput::v1(
            action.session_name(),
            Utc::now(),
            changed_by,
            changed_by_name,
        )?;
        let row = run_cancellable(cancel, self.histories.append_service_history(input)).await??;
        info!(service_history_id = row.id.0, name = %row.name, "audit session opened");
        self.current = Some(row.clone());
        Ok(AuditOutcome::Recorded(row))
    }

    /// Persists `change` under the open session. Recording without a session is a caller bug.
    pub async fn record_operation<E: Entity>(
        &self,
        change: &EntityChange<'_, E>,
        cancel: &CancelSignal,
    ) -> Result<AuditOutcome<OperationHistory>, AuditError> {
        if !self.config.audit_enabled {
            return Ok(AuditOutcome::NotInvokedDisabled);
        }
        let Some(session) = &self.current else {
            warn!(
                table = E::shape().table_name,
                "operation recorded with no open audit session"
            );
            return Err(AuditError::MissingServiceHistory);
        };
        let input = to_operation_history(change, session)?;
        let row = run_cancellable(cancel, self.histories.append_operation_history(input)).await??;
        debug!(
            table = %row.table_name,
            operation = row.operation_type.as_str(),
            service_history_id = session.id.0,
            "audit operation recorded"
        );
        Ok(AuditOutcome::Recorded(row))
    }
}

/// Shared collaborators; hands out per-invocation trackers and readers.
pub struct AuditServiceFactory<U, K> {
    config: AuditWiringConfig,
    histories: Arc<dyn AuditHistoryRepo<K>>,
    users: Arc<dyn UserRepo<U, K>>,
    entities: Arc<dyn EntityRepo>,
    permissions: Arc<dyn PermissionCheck>,
}

impl<U, K> AuditServiceFactory<U, K>
where
    U: AuditUser<K> + Send + Sync + 'static,
    K: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: AuditWiringConfig,
        histories: Arc<dyn AuditHistoryRepo<K>>,
        users: Arc<dyn UserRepo<U, K>>,
        entities: Arc<dyn EntityRepo>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            config,
            histories,
            users,
            entities,
            permissions,
        }
    }

    pub fn config(&self) -> &AuditWiringConfig {
        &self.config
    }

    pub fn scoped(
        &self,
        current_user: Arc<dyn CurrentUserProvider<K>>,
    ) -> AuditSessionTracker<U, K> {
        AuditSessionTracker::new(
            self.config,
            Arc::clone(&self.histories),
            Arc::clone(&self.users),
            current_user,
            Arc::clone(&self.permissions),
        )
    }

    pub fn history_reader(&self) -> HistoryReader<K> {
        HistoryReader::new(
            self.config,
            Arc::clone(&self.histories),
            Arc::clone(&self.entities),
        )
    }

    pub fn entity_reader(&self) -> EntityReader {
        EntityReader::new(self.config, Arc::clone(&self.entities))
    }
}
