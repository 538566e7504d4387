use std::sync::Arc;

use crate::audit::AuditLog;
use crate::auth::repo::CredentialStore;
use crate::auth::services::AuthService;
use crate::clock::{Clock, Delay, NoDelay, SystemClock, TokioDelay};
use crate::config::PortalConfig;
use crate::managers::patients::PatientRecords;
use crate::session::manager::SessionManager;
use crate::session::storage::BrowserStorage;

/// Everything the portal services share. Each instance is an isolated
/// world; tests build their own instead of touching globals.
#[derive(Clone)]
pub struct PortalState {
    pub config: Arc<PortalConfig>,
    pub clock: Arc<dyn Clock>,
    pub delay: Arc<dyn Delay>,
    pub credentials: Arc<CredentialStore>,
    pub audit: Arc<AuditLog>,
    pub patients: Arc<PatientRecords>,
}

impl PortalState {
    pub fn init() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Arc::new(PortalConfig::from_env()?);
        tracing::info!(
            session_key = %config.session_key,
            latency_ms = config.simulated_latency.as_millis() as u64,
            "portal state initialised"
        );
        Ok(Self::from_parts(
            config,
            Arc::new(SystemClock),
            Arc::new(TokioDelay),
        ))
    }

    pub fn from_parts(config: Arc<PortalConfig>, clock: Arc<dyn Clock>, delay: Arc<dyn Delay>) -> Self {
        let audit = Arc::new(AuditLog::new(clock.clone()));
        Self {
            config,
            credentials: Arc::new(CredentialStore::seeded(clock.clone())),
            patients: Arc::new(PatientRecords::seeded(audit.clone())),
            audit,
            clock,
            delay,
        }
    }

    /// Seeded state with no artificial latency, driven by the given clock.
    pub fn fake(clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(Arc::new(PortalConfig::default()), clock, Arc::new(NoDelay))
    }

    pub fn session_manager(&self, storage: BrowserStorage) -> SessionManager {
        SessionManager::new(storage, self.config.session_key, self.clock.clone())
    }

    pub fn auth_service(&self, storage: BrowserStorage) -> AuthService {
        AuthService::new(self.clone(), self.session_manager(storage))
    }
}
