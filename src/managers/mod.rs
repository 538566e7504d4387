//! Per-role mock managers. They reach the session core only through
//! [`AccountDirectory`] for credentials and [`AuditSink`] for audit entries.

pub mod patients;

pub use crate::audit::AuditSink;
pub use crate::auth::repo::AccountDirectory;
