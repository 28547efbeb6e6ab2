#![forbid(unsafe_code)]

pub mod audit;
pub mod cancel;
pub mod config;
pub mod error;
pub mod history;
pub mod listing;
pub mod permission;
pub mod user;

pub use audit::{AuditOutcome, AuditServiceFactory, AuditSessionTracker};
pub use cancel::{cancel_pair, run_cancellable, CancelHandle, CancelSignal, Cancelled};
pub use config::{AuditWiringConfig, ConfigError};
pub use error::AuditError;
pub use history::HistoryReader;
pub use listing::EntityReader;
pub use permission::{ActionTypeGate, PermissionCheck, PermissionDenied};
pub use user::{CurrentUserProvider, ScopedCurrentUser};
