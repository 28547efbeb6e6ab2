#![forbid(unsafe_code)]

pub mod audit;
pub mod common;
pub mod filter;
pub mod value;

pub use common::{ContractViolation, SchemaVersion, Validate};
