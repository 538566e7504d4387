pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod managers;
pub mod session;
pub mod state;
pub mod telemetry;

pub use audit::{AuditLog, AuditLogEntry, AuditSink};
pub use auth::repo_types::{Credential, Role};
pub use auth::services::AuthService;
pub use error::AuthError;
pub use session::manager::{Session, SessionKey, SessionLookup, SessionManager};
pub use state::PortalState;
