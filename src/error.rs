use thiserror::Error;

use crate::auth::repo_types::Role;

/// Outcomes a portal page shows to the user. None of them are fatal; every
/// variant ends in "fix the form" or "log in again".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Unknown username and wrong password look the same on purpose.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is locked due to too many failed attempts. Try again in {remaining_minutes} minute(s).")]
    Locked { remaining_minutes: i64 },

    #[error("No active session")]
    NotAuthenticated,

    /// Logged in, but into the wrong portal for this action.
    #[error("This action requires a {required} account")]
    WrongRole { required: Role },

    #[error("Account {0} not found")]
    UnknownAccount(String),

    /// The browser refused to store the session.
    #[error("Session could not be saved. Please try again.")]
    SessionUnavailable,
}

impl AuthError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AuthError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_message_mentions_lock_and_minutes() {
        let msg = AuthError::Locked { remaining_minutes: 15 }.to_string();
        assert!(msg.contains("locked"));
        assert!(msg.contains("15"));
    }

    #[test]
    fn wrong_role_names_required_portal() {
        let msg = AuthError::WrongRole { required: Role::Patient }.to_string();
        assert_eq!(msg, "This action requires a patient account");
    }

    #[test]
    fn validation_message_names_field() {
        let msg = AuthError::validation("username", "Username is required").to_string();
        assert_eq!(msg, "username: Username is required");
    }
}
