#![forbid(unsafe_code)]

use quarry_kernel_contracts::ContractViolation;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {got} to {expected}")]
pub struct CoercionError {
    pub expected: String,
    pub got: String,
}

impl CoercionError {
    pub fn new(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A field path segment does not exist on the declared entity shape.
    #[error("the field '{field}' was not found in the type '{type_name}'")]
    FieldNotFound {
        type_name: &'static str,
        field: String,
    },
    #[error("filter '{field}': {source}")]
    Coercion {
        field: String,
        #[source]
        source: CoercionError,
    },
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}
