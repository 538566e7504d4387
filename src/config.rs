use std::time::Duration;

use serde::Deserialize;

use crate::session::manager::SessionKey;

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub session_key: SessionKey,
    pub simulated_latency: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            session_key: SessionKey::UserSession,
            simulated_latency: Duration::from_millis(1000),
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_key = match std::env::var("PORTAL_SESSION_KEY") {
            Ok(v) => v.parse::<SessionKey>().map_err(anyhow::Error::msg)?,
            Err(_) => SessionKey::UserSession,
        };
        let simulated_latency = std::env::var("PORTAL_SIMULATED_LATENCY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(1000));
        Ok(Self {
            session_key,
            simulated_latency,
        })
    }
}
