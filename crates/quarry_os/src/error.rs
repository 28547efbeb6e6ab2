#![forbid(unsafe_code)]

use quarry_engines::QueryError;
use quarry_kernel_contracts::ContractViolation;
use quarry_storage::StorageError;
use thiserror::Error;

use crate::cancel::Cancelled;
use crate::permission::PermissionDenied;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    /// `begin_session` was called without the identity of an auditable action.
    #[error("no auditable action context was supplied")]
    NoActionContext,
    #[error("an operation was recorded with no open service history")]
    MissingServiceHistory,
    #[error("a service history is already open for this invocation (id {id})")]
    SessionAlreadyOpen { id: u64 },
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),
    #[error("{type_name} with id {id} was not found")]
    EntityNotFound { type_name: &'static str, id: i64 },
    #[error("service history {id} was not found")]
    ServiceHistoryNotFound { id: u64 },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl From<Cancelled> for AuditError {
    fn from(_: Cancelled) -> Self {
        AuditError::Cancelled
    }
}
