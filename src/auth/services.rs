use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use super::dto::{LoginRequest, RegisterPatientRequest};
use super::lockout;
use super::repo_types::{Credential, NewCredential, Role};
use crate::audit::AuditSink;
use crate::error::AuthError;
use crate::managers::patients::PatientProfile;
use crate::session::manager::{Session, SessionLookup, SessionManager};
use crate::state::PortalState;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.]{3,30}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Minimum 8 chars with upper, lower, digit and a symbol.
pub(crate) fn password_problem(password: &str) -> Option<&'static str> {
    if password.chars().count() < 8 {
        return Some("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("Password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("Password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain a number");
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some("Password must contain a special character");
    }
    None
}

/// Login, logout and account flows for one browser tab.
#[derive(Clone)]
pub struct AuthService {
    state: PortalState,
    sessions: SessionManager,
}

impl AuthService {
    pub fn new(state: PortalState, sessions: SessionManager) -> Self {
        Self { state, sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[instrument(skip(self, req), fields(username = %req.username, role = %req.role))]
    pub async fn login(&self, req: LoginRequest) -> Result<Session, AuthError> {
        let username = req.username.trim();
        if username.is_empty() {
            return Err(AuthError::validation("username", "Username is required"));
        }
        if req.password.is_empty() {
            return Err(AuthError::validation("password", "Password is required"));
        }

        self.state.delay.pause(self.state.config.simulated_latency).await;

        let role = req.role;
        let store = &self.state.credentials;
        let audit = &self.state.audit;
        let now = self.state.clock.now();

        let Some(cred) = store.find_by_username(role, username) else {
            audit.append(username, role, "FAILED_LOGIN", "Login attempt with unknown username");
            warn!("login failed: unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !cred.active {
            audit.append(&cred.id, role, "FAILED_LOGIN", "Login attempt on inactive account");
            warn!(id = %cred.id, "login failed: account inactive");
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(remaining_minutes) = lockout::remaining_minutes(&cred, now) {
            audit.append(
                &cred.id,
                role,
                "LOGIN_BLOCKED",
                &format!("Login attempt while locked ({remaining_minutes} min remaining)"),
            );
            warn!(id = %cred.id, remaining_minutes, "login rejected: account locked");
            return Err(AuthError::Locked { remaining_minutes });
        }

        if cred.password != req.password {
            let updated = store.record_failed_attempt(role, username).unwrap_or(cred);
            audit.append(
                &updated.id,
                role,
                "FAILED_LOGIN",
                &format!("Invalid password (attempt {})", updated.failed_attempts),
            );
            if let Some(remaining_minutes) = lockout::remaining_minutes(&updated, now) {
                audit.append(
                    &updated.id,
                    role,
                    "ACCOUNT_LOCKED",
                    &format!(
                        "Locked after {} failed attempts",
                        updated.failed_attempts
                    ),
                );
                return Err(AuthError::Locked { remaining_minutes });
            }
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.sessions.create_session(&cred, req.remember_me);
        if let Err(e) = self.sessions.save_session(&session) {
            error!(error = %e, id = %cred.id, "login aborted: session not stored");
            return Err(AuthError::SessionUnavailable);
        }
        let cred = store.record_successful_login(role, username).unwrap_or(cred);
        audit.append(
            &cred.id,
            role,
            "LOGIN",
            &format!("{} logged in to the {} portal", cred.full_name, role),
        );
        info!(id = %cred.id, remember_me = req.remember_me, "login succeeded");
        Ok(session)
    }

    /// Clears the stored session; audits the logout when a session was there.
    pub fn logout(&self) {
        match self.sessions.lookup_session() {
            SessionLookup::Active(s) | SessionLookup::Expired(s) => {
                self.state
                    .audit
                    .append(&s.id, s.role, "LOGOUT", &format!("{} logged out", s.username));
                info!(id = %s.id, "logout");
            }
            SessionLookup::Corrupt { .. } | SessionLookup::Absent => {}
        }
        self.sessions.clear_session();
    }

    /// Mount check for protected pages.
    pub fn require_session(&self) -> Result<Session, AuthError> {
        self.sessions.get_session().ok_or(AuthError::NotAuthenticated)
    }

    /// Answer to the timeout warning: issues a fresh session in place of the
    /// current one.
    pub fn extend_session(&self) -> Result<Session, AuthError> {
        let session = self
            .sessions
            .refresh_session()
            .map_err(|e| {
                error!(error = %e, "session refresh not stored");
                AuthError::SessionUnavailable
            })?
            .ok_or(AuthError::NotAuthenticated)?;
        self.state.audit.append(
            &session.id,
            session.role,
            "SESSION_EXTENDED",
            "Session extended from timeout warning",
        );
        Ok(session)
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn register_patient(
        &self,
        req: RegisterPatientRequest,
    ) -> Result<Credential, AuthError> {
        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();
        let full_name = req.full_name.trim().to_string();

        if !is_valid_username(&username) {
            return Err(AuthError::validation(
                "username",
                "Username must be 3-30 letters, numbers, dots or underscores",
            ));
        }
        if !is_valid_email(&email) {
            return Err(AuthError::validation("email", "Invalid email"));
        }
        if full_name.is_empty() {
            return Err(AuthError::validation("fullName", "Full name is required"));
        }
        if let Some(problem) = password_problem(&req.password) {
            return Err(AuthError::validation("password", problem));
        }
        if req.password != req.confirm_password {
            return Err(AuthError::validation("confirmPassword", "Passwords do not match"));
        }

        self.state.delay.pause(self.state.config.simulated_latency).await;

        let taken = || AuthError::validation("username", "Username is already taken");
        if !self.state.credentials.is_username_globally_unique(&username) {
            return Err(taken());
        }
        let cred = self
            .state
            .credentials
            .create(
                Role::Patient,
                NewCredential {
                    username,
                    password: req.password,
                    full_name,
                    email: Some(email),
                },
            )
            .ok_or_else(taken)?;

        self.state.patients.insert(PatientProfile {
            id: cred.id.clone(),
            full_name: cred.full_name.clone(),
            email: cred.email.clone().unwrap_or_default(),
            phone: String::new(),
            address: String::new(),
            emergency_contact: None,
        });

        self.state.audit.append(
            &cred.id,
            Role::Patient,
            "REGISTER",
            &format!("New patient account {}", cred.username),
        );
        Ok(cred)
    }

    /// Always looks successful to the caller so usernames cannot be probed.
    pub async fn request_password_reset(&self, role: Role, username: &str) -> Result<(), AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::validation("username", "Username is required"));
        }

        self.state.delay.pause(self.state.config.simulated_latency).await;

        let actor_id = self
            .state
            .credentials
            .find_by_username(role, username)
            .map(|c| c.id)
            .unwrap_or_else(|| username.to_string());
        self.state.audit.append(
            &actor_id,
            role,
            "PASSWORD_RESET_REQUEST",
            &format!("Password reset requested for {username}"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::managers::patients::EmergencyContact;
    use crate::session::storage::{BrowserStorage, KeyValueStore, StorageError};
    use std::sync::Arc;
    use time::macros::datetime;
    use time::Duration;

    fn setup() -> (AuthService, PortalState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-07-01 08:00 UTC)));
        let state = PortalState::fake(clock.clone());
        let auth = state.auth_service(BrowserStorage::in_memory());
        (auth, state, clock)
    }

    fn login_req(username: &str, password: &str, role: Role, remember_me: bool) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
            role,
            remember_me,
        }
    }

    fn register_req(username: &str) -> RegisterPatientRequest {
        RegisterPatientRequest {
            username: username.into(),
            email: "Jane.Doe@Email.com ".into(),
            password: "Patient456!".into(),
            confirm_password: "Patient456!".into(),
            full_name: "Jane Doe".into(),
        }
    }

    #[tokio::test]
    async fn login_issues_session_and_audits() {
        let (auth, state, clock) = setup();
        let session = auth
            .login(login_req("johndoe", "Patient123!", Role::Patient, false))
            .await
            .expect("login should succeed");

        assert_eq!(session.id, "pat001");
        assert_eq!(session.role, Role::Patient);
        assert_eq!(session.login_time, clock.now());
        assert_eq!(session.expires_at - session.login_time, Duration::hours(8));
        assert_eq!(auth.require_session(), Ok(session));

        let entries = state.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "LOGIN");
        assert_eq!(entries[0].actor_id, "pat001");

        let cred = state.credentials.find_by_username(Role::Patient, "johndoe").unwrap();
        assert_eq!(cred.last_login, Some(clock.now()));
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_alike() {
        let (auth, _, _) = setup();
        let unknown = auth
            .login(login_req("nobody", "Patient123!", Role::Patient, false))
            .await
            .unwrap_err();
        let wrong = auth
            .login(login_req("johndoe", "nope", Role::Patient, false))
            .await
            .unwrap_err();
        assert_eq!(unknown, AuthError::InvalidCredentials);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_is_scoped_to_role() {
        let (auth, _, _) = setup();
        let err = auth
            .login(login_req("drsmith", "Doctor123!", Role::Patient, false))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn empty_fields_are_validation_errors() {
        let (auth, state, _) = setup();
        let err = auth.login(login_req("  ", "x", Role::Patient, false)).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "username", .. }));
        let err = auth.login(login_req("johndoe", "", Role::Patient, false)).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "password", .. }));
        assert!(state.audit.is_empty());
    }

    #[tokio::test]
    async fn drsmith_lockout_scenario() {
        let (auth, state, clock) = setup();

        for attempt in 1..=5 {
            let err = auth
                .login(login_req("drsmith", "wrong", Role::Provider, false))
                .await
                .unwrap_err();
            if attempt < 5 {
                assert_eq!(err, AuthError::InvalidCredentials);
            } else {
                assert_eq!(err, AuthError::Locked { remaining_minutes: 15 });
            }
        }
        let fifth_at = clock.now();
        let cred = state.credentials.find_by_username(Role::Provider, "drsmith").unwrap();
        assert_eq!(cred.lock_until, Some(fifth_at + Duration::minutes(15)));

        // correct password is still refused while locked
        clock.advance(Duration::minutes(5));
        let err = auth
            .login(login_req("drsmith", "Doctor123!", Role::Provider, false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("locked"));
        assert_eq!(err, AuthError::Locked { remaining_minutes: 10 });
        assert!(auth.require_session().is_err());

        // lock expiry alone leaves the counter untouched
        clock.set(fifth_at + Duration::minutes(15) + Duration::seconds(1));
        let cred = state.credentials.find_by_username(Role::Provider, "drsmith").unwrap();
        assert_eq!(cred.failed_attempts, 5);

        let session = auth
            .login(login_req("drsmith", "Doctor123!", Role::Provider, false))
            .await
            .expect("login after lock expiry");
        assert_eq!(session.role, Role::Provider);
        let cred = state.credentials.find_by_username(Role::Provider, "drsmith").unwrap();
        assert_eq!(cred.failed_attempts, 0);
        assert!(cred.lock_until.is_none());

        let actions: Vec<_> = state.audit.entries().into_iter().map(|e| e.action).collect();
        assert_eq!(actions.iter().filter(|a| *a == "FAILED_LOGIN").count(), 5);
        assert!(actions.contains(&"ACCOUNT_LOCKED".to_string()));
        assert!(actions.contains(&"LOGIN_BLOCKED".to_string()));
        assert_eq!(actions.last().map(String::as_str), Some("LOGIN"));
    }

    #[tokio::test]
    async fn failure_after_expired_lock_relocks() {
        let (auth, state, clock) = setup();
        for _ in 0..5 {
            let _ = auth.login(login_req("reception1", "bad", Role::Receptionist, false)).await;
        }
        clock.advance(Duration::minutes(16));
        let err = auth
            .login(login_req("reception1", "bad", Role::Receptionist, false))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Locked { remaining_minutes: 15 });
        let cred = state
            .credentials
            .find_by_username(Role::Receptionist, "reception1")
            .unwrap();
        assert_eq!(cred.failed_attempts, 6);
    }

    #[tokio::test]
    async fn success_at_four_failures_resets_counter() {
        let (auth, state, _) = setup();
        for _ in 0..4 {
            let _ = auth.login(login_req("johndoe", "bad", Role::Patient, false)).await;
        }
        auth.login(login_req("johndoe", "Patient123!", Role::Patient, false))
            .await
            .unwrap();
        let cred = state.credentials.find_by_username(Role::Patient, "johndoe").unwrap();
        assert_eq!(cred.failed_attempts, 0);
        assert!(cred.lock_until.is_none());
    }

    #[tokio::test]
    async fn inactive_account_cannot_log_in() {
        let (auth, state, _) = setup();
        state.credentials.deactivate(Role::Patient, "johndoe");
        let err = auth
            .login(login_req("johndoe", "Patient123!", Role::Patient, false))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn remember_me_session_lasts_thirty_days() {
        let (auth, _, clock) = setup();
        let session = auth
            .login(login_req("drsmith", "Doctor123!", Role::Provider, true))
            .await
            .unwrap();
        assert!(session.remember_me);
        clock.advance(Duration::days(29));
        assert!(auth.require_session().is_ok());
        clock.advance(Duration::days(1));
        assert_eq!(auth.require_session(), Err(AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn logout_clears_and_audits() {
        let (auth, state, _) = setup();
        auth.login(login_req("johndoe", "Patient123!", Role::Patient, true))
            .await
            .unwrap();
        auth.logout();
        assert_eq!(auth.require_session(), Err(AuthError::NotAuthenticated));
        assert_eq!(auth.sessions().lookup_session(), SessionLookup::Absent);
        let last = state.audit.entries().pop().unwrap();
        assert_eq!(last.action, "LOGOUT");

        // logging out again is a no-op
        auth.logout();
        assert_eq!(state.audit.len(), 2);
    }

    #[tokio::test]
    async fn tabs_have_independent_ephemeral_sessions() {
        let (auth, state, _) = setup();
        let storage = BrowserStorage::in_memory();
        let tab1 = state.auth_service(storage.clone());
        let tab2 = state.auth_service(storage.new_tab());

        tab1.login(login_req("johndoe", "Patient123!", Role::Patient, false))
            .await
            .unwrap();
        assert!(tab1.require_session().is_ok());
        assert!(tab2.require_session().is_err());
        assert!(auth.require_session().is_err());
    }

    #[tokio::test]
    async fn extend_session_reissues_from_now() {
        let (auth, state, clock) = setup();
        auth.login(login_req("johndoe", "Patient123!", Role::Patient, false))
            .await
            .unwrap();
        clock.advance(Duration::hours(7) + Duration::minutes(55));
        let extended = auth.extend_session().unwrap();
        assert_eq!(extended.login_time, clock.now());
        assert_eq!(extended.expires_at, clock.now() + Duration::hours(8));
        assert_eq!(state.audit.entries().last().unwrap().action, "SESSION_EXTENDED");

        auth.logout();
        assert_eq!(auth.extend_session(), Err(AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn register_patient_then_login() {
        let (auth, state, _) = setup();
        let cred = auth.register_patient(register_req("janedoe")).await.unwrap();
        assert_eq!(cred.id, "pat002");
        assert_eq!(cred.role, Role::Patient);
        assert_eq!(cred.email.as_deref(), Some("jane.doe@email.com"));
        assert_eq!(state.audit.entries()[0].action, "REGISTER");

        let session = auth
            .login(login_req("janedoe", "Patient456!", Role::Patient, false))
            .await
            .unwrap();
        assert_eq!(session.full_name, "Jane Doe");
    }

    #[tokio::test]
    async fn registered_patient_can_use_patient_records() {
        let (auth, state, _) = setup();
        auth.register_patient(register_req("janedoe")).await.unwrap();
        let profile = state.patients.get_profile("pat002").expect("profile created");
        assert_eq!(profile.full_name, "Jane Doe");
        assert_eq!(profile.email, "jane.doe@email.com");
        assert!(profile.emergency_contact.is_none());

        auth.login(login_req("janedoe", "Patient456!", Role::Patient, false))
            .await
            .unwrap();
        let session = auth.require_session().unwrap();
        let updated = state
            .patients
            .update_emergency_contact(
                &session,
                EmergencyContact {
                    name: "John Doe".into(),
                    relationship: "Brother".into(),
                    phone: "555-444-1212".into(),
                },
            )
            .unwrap();
        assert_eq!(updated.emergency_contact.unwrap().relationship, "Brother");

        let actions: Vec<_> = state
            .audit
            .entries_for_actor("pat002")
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, ["REGISTER", "LOGIN", "UPDATE_EMERGENCY_CONTACT"]);
    }

    struct RejectingStore;

    impl KeyValueStore for RejectingStore {
        fn get_item(&self, _key: &str) -> Option<String> {
            None
        }
        fn set_item(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded)
        }
        fn remove_item(&self, _key: &str) {}
    }

    #[tokio::test]
    async fn login_fails_when_session_cannot_be_stored() {
        let (_, state, _) = setup();
        let auth = state.auth_service(BrowserStorage::new(
            Arc::new(RejectingStore),
            Arc::new(RejectingStore),
        ));
        for _ in 0..2 {
            let _ = auth.login(login_req("johndoe", "bad", Role::Patient, false)).await;
        }

        let err = auth
            .login(login_req("johndoe", "Patient123!", Role::Patient, true))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SessionUnavailable);
        assert!(state.audit.entries().iter().all(|e| e.action != "LOGIN"));
        let cred = state.credentials.find_by_username(Role::Patient, "johndoe").unwrap();
        assert_eq!(cred.failed_attempts, 2);
        assert!(cred.last_login.is_none());
    }

    #[tokio::test]
    async fn register_rejects_username_from_any_role() {
        let (auth, _, _) = setup();
        let err = auth.register_patient(register_req("drsmith")).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::validation("username", "Username is already taken")
        );
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let (auth, state, _) = setup();

        let mut req = register_req("x");
        let err = auth.register_patient(req.clone()).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "username", .. }));

        req = register_req("janedoe");
        req.email = "not-an-email".into();
        let err = auth.register_patient(req).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "email", .. }));

        req = register_req("janedoe");
        req.password = "weakpass".into();
        req.confirm_password = "weakpass".into();
        let err = auth.register_patient(req).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "password", .. }));

        req = register_req("janedoe");
        req.confirm_password = "Patient457!".into();
        let err = auth.register_patient(req).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "confirmPassword", .. }));

        assert!(state.audit.is_empty());
        assert!(state.credentials.is_username_globally_unique("janedoe"));
    }

    #[tokio::test]
    async fn password_reset_request_is_audited_for_known_and_unknown() {
        let (auth, state, _) = setup();
        auth.request_password_reset(Role::Patient, "johndoe").await.unwrap();
        auth.request_password_reset(Role::Patient, "ghost").await.unwrap();

        let entries = state.audit.entries();
        assert_eq!(entries[0].action, "PASSWORD_RESET_REQUEST");
        assert_eq!(entries[0].actor_id, "pat001");
        assert_eq!(entries[1].actor_id, "ghost");
    }

    #[test]
    fn password_rules() {
        assert_eq!(password_problem("Doctor123!"), None);
        assert!(password_problem("Sh0rt!").is_some());
        assert!(password_problem("nouppercase1!").is_some());
        assert!(password_problem("NOLOWERCASE1!").is_some());
        assert!(password_problem("NoDigits!!").is_some());
        assert!(password_problem("NoSymbol123").is_some());
    }

    #[test]
    fn email_and_username_shapes() {
        assert!(is_valid_email("john.doe@email.com"));
        assert!(!is_valid_email("john.doe@email"));
        assert!(is_valid_username("john_doe.2"));
        assert!(!is_valid_username("jd"));
        assert!(!is_valid_username("john doe"));
    }
}
