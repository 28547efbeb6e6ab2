#![forbid(unsafe_code)]

pub mod coerce;
pub mod error;
pub mod fields;
pub mod predicate;
pub mod recorder;
pub mod shaping;

pub use coerce::{coerce, filter_value};
pub use error::{CoercionError, QueryError};
pub use fields::{Entity, EntityShape, FieldAccessor, FieldTable};
pub use predicate::{build_predicate, Predicate};
pub use recorder::{to_operation_history, EntityChange, PropertyChange};
pub use shaping::{build_catalog, like, Query, QueryStage};
