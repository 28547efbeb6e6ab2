#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_kernel_contracts::audit::{ActionContext, ActionType};
use thiserror::Error;

use crate::user::CurrentUserProvider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied for {action}: {reason}")]
pub struct PermissionDenied {
    pub action: String,
    pub reason: String,
}

impl PermissionDenied {
    pub fn new(action: &ActionContext, reason: impl Into<String>) -> Self {
        Self {
            action: action.session_name(),
            reason: reason.into(),
        }
    }
}

/// Authorization collaborator consulted before a service history is opened.
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn validate_current_user_has_permission(
        &self,
        action: &ActionContext,
    ) -> Result<(), PermissionDenied>;
}

/// Gates actions by [`ActionType`] against a fixed administrator set.
pub struct ActionTypeGate<K> {
    current_user: Arc<dyn CurrentUserProvider<K>>,
    admins: BTreeSet<K>,
}

impl<K: Ord> ActionTypeGate<K> {
    pub fn new(current_user: Arc<dyn CurrentUserProvider<K>>, admins: BTreeSet<K>) -> Self {
        Self {
            current_user,
            admins,
        }
    }
}

#[async_trait]
impl<K> PermissionCheck for ActionTypeGate<K>
where
    K: Ord + Send + Sync + 'static,
{
    async fn validate_current_user_has_permission(
        &self,
        action: &ActionContext,
    ) -> Result<(), PermissionDenied> {
        let user_id = self
            .current_user
            .current_user_id()
            .ok_or_else(|| PermissionDenied::new(action, "no authenticated user"))?;
        let is_admin = self.admins.contains(&user_id);
        match action.action_type {
            ActionType::RegularUsersAndAdmins => Ok(()),
            ActionType::OnlyAdmins if is_admin => Ok(()),
            ActionType::OnlyAdmins => Err(PermissionDenied::new(
                action,
                "action requires an administrator",
            )),
            ActionType::OnlyRegularUsers if !is_admin => Ok(()),
            ActionType::OnlyRegularUsers => Err(PermissionDenied::new(
                action,
                "action is restricted to regular users",
            )),
        }
    }
}
