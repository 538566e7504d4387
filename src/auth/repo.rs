use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::lockout;
use super::repo_types::{Credential, NewCredential, Role};
use crate::clock::Clock;

/// What the session core needs from a role's account list.
pub trait AccountDirectory: Send + Sync {
    fn find_by_username(&self, username: &str) -> Option<Credential>;

    /// Bumps the counter and locks the account once it reaches the threshold.
    /// Returns the updated record, `None` for unknown usernames.
    fn record_failed_attempt(&self, username: &str) -> Option<Credential>;

    /// Zeroes the counter, clears the lock and stamps last-login.
    fn record_successful_login(&self, username: &str) -> Option<Credential>;
}

/// Accounts of a single role.
pub struct RoleAccounts {
    role: Role,
    accounts: RwLock<Vec<Credential>>,
    clock: Arc<dyn Clock>,
}

impl RoleAccounts {
    pub fn new(role: Role, clock: Arc<dyn Clock>) -> Self {
        Self {
            role,
            accounts: RwLock::new(Vec::new()),
            clock,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn next_id(&self, accounts: &[Credential]) -> String {
        let prefix = self.role.id_prefix();
        let max = accounts
            .iter()
            .filter_map(|c| c.id.strip_prefix(prefix))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("{prefix}{:03}", max + 1)
    }

    fn insert(&self, new: NewCredential) -> Credential {
        let mut accounts = self.accounts.write();
        let cred = Credential {
            id: self.next_id(&accounts),
            username: new.username,
            password: new.password,
            role: self.role,
            full_name: new.full_name,
            email: new.email,
            active: true,
            failed_attempts: 0,
            lock_until: None,
            last_login: None,
        };
        accounts.push(cred.clone());
        cred
    }

    fn update<F>(&self, username: &str, f: F) -> Option<Credential>
    where
        F: FnOnce(&mut Credential),
    {
        let mut accounts = self.accounts.write();
        let cred = accounts.iter_mut().find(|c| c.username == username)?;
        f(cred);
        Some(cred.clone())
    }

    fn contains(&self, username: &str) -> bool {
        self.accounts.read().iter().any(|c| c.username == username)
    }
}

impl AccountDirectory for RoleAccounts {
    fn find_by_username(&self, username: &str) -> Option<Credential> {
        self.accounts
            .read()
            .iter()
            .find(|c| c.username == username)
            .cloned()
    }

    fn record_failed_attempt(&self, username: &str) -> Option<Credential> {
        let now = self.clock.now();
        let updated = self.update(username, |c| {
            c.failed_attempts += 1;
            if let Some(until) = lockout::lock_for(c.failed_attempts, now) {
                c.lock_until = Some(until);
            }
        })?;
        if updated.lock_until.is_some_and(|until| until > now) {
            warn!(username, attempts = updated.failed_attempts, "account locked");
        } else {
            debug!(username, attempts = updated.failed_attempts, "failed login attempt recorded");
        }
        Some(updated)
    }

    fn record_successful_login(&self, username: &str) -> Option<Credential> {
        let now = self.clock.now();
        self.update(username, |c| {
            c.failed_attempts = 0;
            c.lock_until = None;
            c.last_login = Some(now);
        })
    }
}

/// Patient, provider and receptionist accounts. Lookups are per role;
/// username uniqueness is checked across all three.
pub struct CredentialStore {
    patients: RoleAccounts,
    providers: RoleAccounts,
    receptionists: RoleAccounts,
}

impl CredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            patients: RoleAccounts::new(Role::Patient, clock.clone()),
            providers: RoleAccounts::new(Role::Provider, clock.clone()),
            receptionists: RoleAccounts::new(Role::Receptionist, clock),
        }
    }

    /// Store with the demo accounts every portal starts with.
    pub fn seeded(clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(clock);
        let seeds = [
            (Role::Patient, "johndoe", "Patient123!", "John Doe", "john.doe@email.com"),
            (Role::Provider, "drsmith", "Doctor123!", "Dr. Sarah Smith", "sarah.smith@atlantis.health"),
            (Role::Receptionist, "reception1", "Reception123!", "Maria Garcia", "maria.garcia@atlantis.health"),
        ];
        for (role, username, password, full_name, email) in seeds {
            store.accounts(role).insert(NewCredential {
                username: username.into(),
                password: password.into(),
                full_name: full_name.into(),
                email: Some(email.into()),
            });
        }
        info!(accounts = seeds.len(), "credential store seeded");
        store
    }

    pub fn accounts(&self, role: Role) -> &RoleAccounts {
        match role {
            Role::Patient => &self.patients,
            Role::Provider => &self.providers,
            Role::Receptionist => &self.receptionists,
        }
    }

    /// Case-sensitive exact match within one role.
    pub fn find_by_username(&self, role: Role, username: &str) -> Option<Credential> {
        self.accounts(role).find_by_username(username)
    }

    pub fn is_username_globally_unique(&self, username: &str) -> bool {
        Role::ALL.iter().all(|r| !self.accounts(*r).contains(username))
    }

    pub fn record_failed_attempt(&self, role: Role, username: &str) -> Option<Credential> {
        self.accounts(role).record_failed_attempt(username)
    }

    pub fn record_successful_login(&self, role: Role, username: &str) -> Option<Credential> {
        self.accounts(role).record_successful_login(username)
    }

    /// Adds an account. Callers check uniqueness first; this returns `None`
    /// if the username is taken anywhere.
    pub fn create(&self, role: Role, new: NewCredential) -> Option<Credential> {
        if !self.is_username_globally_unique(&new.username) {
            return None;
        }
        let cred = self.accounts(role).insert(new);
        info!(id = %cred.id, username = %cred.username, role = ?role, "account created");
        Some(cred)
    }

    /// Accounts are never deleted, only switched off.
    pub fn deactivate(&self, role: Role, username: &str) -> Option<Credential> {
        self.accounts(role).update(username, |c| c.active = false)
    }
}
