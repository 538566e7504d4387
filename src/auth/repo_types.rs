use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Portal the account logs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Provider,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Patient, Role::Provider, Role::Receptionist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Provider => "provider",
            Role::Receptionist => "receptionist",
        }
    }

    /// Prefix of generated account ids (`pat001`, `prov001`, `rec001`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Role::Patient => "pat",
            Role::Provider => "prov",
            Role::Receptionist => "rec",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "provider" => Ok(Role::Provider),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Login record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,                          // opaque account id
    pub username: String,                    // unique across all roles
    #[serde(skip_serializing)]
    pub password: String,                    // plaintext, mock only
    pub role: Role,
    pub full_name: String,
    pub email: Option<String>,
    pub active: bool,
    pub failed_attempts: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub lock_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

/// Fields supplied when an account is created.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
}
