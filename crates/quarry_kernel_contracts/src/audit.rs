#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const NAME_MAX_LEN: usize = 256;
const TABLE_NAME_MAX_LEN: usize = 128;
const SNAPSHOT_MAX_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceHistoryId(pub u64);

impl Validate for ServiceHistoryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "service_history_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationHistoryId(pub u64);

impl Validate for OperationHistoryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "operation_history_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Who may invoke an auditable action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[default]
    RegularUsersAndAdmins,
    OnlyAdmins,
    OnlyRegularUsers,
}

/// Declared identity of the auditable operation that opens a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionContext {
    pub service: String,
    pub method: String,
    pub action_type: ActionType,
}

impl ActionContext {
    pub fn v1(
        service: impl Into<String>,
        method: impl Into<String>,
        action_type: ActionType,
    ) -> Result<Self, ContractViolation> {
        let ctx = Self {
            service: service.into(),
            method: method.into(),
            action_type,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// `"<service>\<method>"`.
    pub fn session_name(&self) -> String {
        format!("{}\\{}", self.service, self.method)
    }
}

impl Validate for ActionContext {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("action_context.service", &self.service, 128)?;
        validate_text("action_context.method", &self.method, 128)?;
        if self.service.contains('\\') || self.method.contains('\\') {
            return Err(ContractViolation::InvalidValue {
                field: "action_context",
                reason: "names must not contain '\\'",
            });
        }
        Ok(())
    }
}

/// User that owns audited changes.
pub trait AuditUser<K> {
    fn user_id(&self) -> K;
    fn display_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Added,
    Modified,
    Deleted,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Added => "Added",
            OperationType::Modified => "Modified",
            OperationType::Deleted => "Deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHistoryInput<K> {
    pub schema_version: SchemaVersion,
    pub name: String,
    pub changed_on: DateTime<Utc>,
    pub changed_by: Option<K>,
    pub changed_by_name: Option<String>,
}

impl<K> ServiceHistoryInput<K> {
    pub fn v1(
        name: String,
        changed_on: DateTime<Utc>,
        changed_by: Option<K>,
        changed_by_name: Option<String>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            name,
            changed_on,
            changed_by,
            changed_by_name,
        };
        input.validate()?;
        Ok(input)
    }
}

impl<K> Validate for ServiceHistoryInput<K> {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "service_history_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        validate_text("service_history_input.name", &self.name, NAME_MAX_LEN)?;
        if let Some(n) = &self.changed_by_name {
            validate_text("service_history_input.changed_by_name", n, NAME_MAX_LEN)?;
        }
        Ok(())
    }
}

/// One audited service invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHistory<K> {
    pub id: ServiceHistoryId,
    pub name: String,
    pub changed_on: DateTime<Utc>,
    pub changed_by: Option<K>,
    pub changed_by_name: Option<String>,
}

impl<K> ServiceHistory<K> {
    pub fn from_input_v1(
        id: ServiceHistoryId,
        input: ServiceHistoryInput<K>,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        id.validate()?;
        Ok(Self {
            id,
            name: input.name,
            changed_on: input.changed_on,
            changed_by: input.changed_by,
            changed_by_name: input.changed_by_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHistoryInput {
    pub schema_version: SchemaVersion,
    pub service_history_id: ServiceHistoryId,
    pub table_name: String,
    pub entity_name: String,
    pub entity_id: Option<i64>,
    pub operation_type: OperationType,
    pub old_values: String,
    pub new_values: String,
}

impl OperationHistoryInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        service_history_id: ServiceHistoryId,
        table_name: String,
        entity_name: String,
        entity_id: Option<i64>,
        operation_type: OperationType,
        old_values: String,
        new_values: String,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            service_history_id,
            table_name,
            entity_name,
            entity_id,
            operation_type,
            old_values,
            new_values,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for OperationHistoryInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "operation_history_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        self.service_history_id.validate()?;
        validate_text(
            "operation_history_input.table_name",
            &self.table_name,
            TABLE_NAME_MAX_LEN,
        )?;
        validate_text(
            "operation_history_input.entity_name",
            &self.entity_name,
            TABLE_NAME_MAX_LEN,
        )?;
        if self.old_values.len() > SNAPSHOT_MAX_BYTES || self.new_values.len() > SNAPSHOT_MAX_BYTES
        {
            return Err(ContractViolation::InvalidValue {
                field: "operation_history_input.values",
                reason: "snapshot must be <= 1 MiB",
            });
        }
        Ok(())
    }
}

/// One captured entity mutation inside a service history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHistory {
    pub id: OperationHistoryId,
    pub service_history_id: ServiceHistoryId,
    pub table_name: String,
    pub entity_name: String,
    pub entity_id: Option<i64>,
    pub operation_type: OperationType,
    pub old_values: String,
    pub new_values: String,
}

impl OperationHistory {
    pub fn from_input_v1(
        id: OperationHistoryId,
        input: OperationHistoryInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        id.validate()?;
        Ok(Self {
            id,
            service_history_id: input.service_history_id,
            table_name: input.table_name,
            entity_name: input.entity_name,
            entity_id: input.entity_id,
            operation_type: input.operation_type,
            old_values: input.old_values,
            new_values: input.new_values,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHistoryListItem {
    pub id: u64,
    pub name: String,
    pub changed_on: DateTime<Utc>,
    pub changed_by_name: Option<String>,
}

impl<K> From<ServiceHistory<K>> for ServiceHistoryListItem {
    fn from(h: ServiceHistory<K>) -> Self {
        Self {
            id: h.id.0,
            name: h.name,
            changed_on: h.changed_on,
            changed_by_name: h.changed_by_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHistoryListItem {
    pub id: u64,
    pub entity_id: Option<i64>,
    pub entity_name: String,
    pub table_name: String,
    pub operation_type: String,
    pub old_values: String,
    pub new_values: String,
}

impl From<OperationHistory> for OperationHistoryListItem {
    fn from(h: OperationHistory) -> Self {
        Self {
            id: h.id.0,
            entity_id: h.entity_id,
            entity_name: h.entity_name,
            table_name: h.table_name,
            operation_type: h.operation_type.as_str().to_string(),
            old_values: h.old_values,
            new_values: h.new_values,
        }
    }
}
