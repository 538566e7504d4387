use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, warn};

use super::storage::{BrowserStorage, StorageError, StorageScope};
use crate::auth::repo_types::{Credential, Role};
use crate::clock::Clock;

pub const SESSION_TTL: Duration = Duration::hours(8);
pub const REMEMBER_ME_TTL: Duration = Duration::days(30);

/// Storage key the session is written under. Portal pages disagree on which
/// one to use, so both remain selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKey {
    #[serde(rename = "userSession")]
    UserSession,
    #[serde(rename = "atlantis_session")]
    AtlantisSession,
}

impl SessionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::UserSession => "userSession",
            SessionKey::AtlantisSession => "atlantis_session",
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "userSession" => Ok(SessionKey::UserSession),
            "atlantis_session" => Ok(SessionKey::AtlantisSession),
            other => Err(format!("unknown session key: {other}")),
        }
    }
}

/// Client-held proof of login. Nothing signs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub full_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub login_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub remember_me: bool,
}

impl Session {
    pub fn ttl(remember_me: bool) -> Duration {
        if remember_me {
            REMEMBER_ME_TTL
        } else {
            SESSION_TTL
        }
    }

    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// Result of reading the stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Session),
    /// Parsed fine but `now >= expires_at`. Left in storage.
    Expired(Session),
    /// Stored value did not parse.
    Corrupt { scope: StorageScope, reason: String },
    Absent,
}

impl SessionLookup {
    pub fn into_active(self) -> Option<Session> {
        match self {
            SessionLookup::Active(s) => Some(s),
            _ => None,
        }
    }
}

/// Issues, stores and reads sessions for one browser tab.
#[derive(Clone)]
pub struct SessionManager {
    storage: BrowserStorage,
    key: SessionKey,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(storage: BrowserStorage, key: SessionKey, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            key,
            clock,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn storage(&self) -> &BrowserStorage {
        &self.storage
    }

    pub fn create_session(&self, cred: &Credential, remember_me: bool) -> Session {
        let now = self.clock.now();
        Session {
            id: cred.id.clone(),
            username: cred.username.clone(),
            role: cred.role,
            full_name: cred.full_name.clone(),
            login_time: now,
            expires_at: now + Session::ttl(remember_me),
            remember_me,
        }
    }

    /// Writes into the scope picked by `remember_me`. The other scope is not
    /// touched, so an older session there survives.
    pub fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let scope = StorageScope::for_remember_me(session.remember_me);
        let raw = serde_json::to_string(session)?;
        self.storage
            .scope(scope)
            .set_item(self.key.as_str(), raw)
            .map_err(|e| {
                error!(error = %e, username = %session.username, ?scope, "session save failed");
                e
            })?;
        debug!(username = %session.username, ?scope, key = %self.key, "session saved");
        Ok(())
    }

    /// The first scope in read order that holds a value decides the outcome;
    /// an expired or corrupt ephemeral value shadows a persistent one.
    pub fn lookup_session(&self) -> SessionLookup {
        let now = self.clock.now();
        for scope in StorageScope::READ_ORDER {
            let Some(raw) = self.storage.scope(scope).get_item(self.key.as_str()) else {
                continue;
            };
            return match serde_json::from_str::<Session>(&raw) {
                Ok(session) if session.is_valid_at(now) => SessionLookup::Active(session),
                Ok(session) => {
                    debug!(username = %session.username, ?scope, "stored session expired");
                    SessionLookup::Expired(session)
                }
                Err(e) => {
                    warn!(error = %e, ?scope, key = %self.key, "stored session is corrupt");
                    SessionLookup::Corrupt {
                        scope,
                        reason: e.to_string(),
                    }
                }
            };
        }
        SessionLookup::Absent
    }

    pub fn get_session(&self) -> Option<Session> {
        self.lookup_session().into_active()
    }

    pub fn clear_session(&self) {
        for scope in StorageScope::READ_ORDER {
            self.storage.scope(scope).remove_item(self.key.as_str());
        }
        debug!(key = %self.key, "session cleared");
    }

    /// Re-issues the active session with expiry recomputed from now.
    /// `Ok(None)` when there is no active session to refresh.
    pub fn refresh_session(&self) -> Result<Option<Session>, StorageError> {
        let Some(current) = self.get_session() else {
            return Ok(None);
        };
        let now = self.clock.now();
        let refreshed = Session {
            login_time: now,
            expires_at: now + Session::ttl(current.remember_me),
            ..current
        };
        self.save_session(&refreshed)?;
        Ok(Some(refreshed))
    }
}
