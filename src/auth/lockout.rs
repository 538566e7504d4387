use time::{Duration, OffsetDateTime};

use super::repo_types::Credential;

/// Failed attempts that trigger a lock. Same for every role.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

pub const LOCK_DURATION: Duration = Duration::minutes(15);

/// Locked iff a lock-until is set and still in the future. The failed-attempt
/// counter plays no part here; an expired lock leaves the counter as it was.
pub fn is_locked(cred: &Credential, now: OffsetDateTime) -> bool {
    matches!(cred.lock_until, Some(until) if until > now)
}

/// Whole minutes left on the lock, rounded up. `None` when not locked.
pub fn remaining_minutes(cred: &Credential, now: OffsetDateTime) -> Option<i64> {
    let until = cred.lock_until.filter(|until| *until > now)?;
    let secs = (until - now).whole_seconds();
    Some(((secs + 59) / 60).max(1))
}

/// Lock-until for a counter value, if the counter has reached the threshold.
pub fn lock_for(failed_attempts: u32, now: OffsetDateTime) -> Option<OffsetDateTime> {
    (failed_attempts >= MAX_FAILED_ATTEMPTS).then(|| now + LOCK_DURATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;
    use time::macros::datetime;

    fn cred(lock_until: Option<OffsetDateTime>) -> Credential {
        Credential {
            id: "prov001".into(),
            username: "drsmith".into(),
            password: "Doctor123!".into(),
            role: Role::Provider,
            full_name: "Dr. Sarah Smith".into(),
            email: None,
            active: true,
            failed_attempts: 5,
            lock_until,
            last_login: None,
        }
    }

    #[test]
    fn locked_only_before_lock_until() {
        let until = datetime!(2024-01-01 10:15 UTC);
        let c = cred(Some(until));
        assert!(is_locked(&c, datetime!(2024-01-01 10:14:59 UTC)));
        assert!(!is_locked(&c, until));
        assert!(!is_locked(&c, datetime!(2024-01-01 11:00 UTC)));
        assert!(!is_locked(&cred(None), until));
    }

    #[test]
    fn remaining_minutes_rounds_up() {
        let c = cred(Some(datetime!(2024-01-01 10:15 UTC)));
        assert_eq!(remaining_minutes(&c, datetime!(2024-01-01 10:00 UTC)), Some(15));
        assert_eq!(remaining_minutes(&c, datetime!(2024-01-01 10:00:30 UTC)), Some(15));
        assert_eq!(remaining_minutes(&c, datetime!(2024-01-01 10:14:59 UTC)), Some(1));
        assert_eq!(remaining_minutes(&c, datetime!(2024-01-01 10:15 UTC)), None);
    }

    #[test]
    fn lock_starts_at_threshold() {
        let now = datetime!(2024-01-01 10:00 UTC);
        assert_eq!(lock_for(4, now), None);
        assert_eq!(lock_for(5, now), Some(datetime!(2024-01-01 10:15 UTC)));
        assert_eq!(lock_for(6, now), Some(datetime!(2024-01-01 10:15 UTC)));
    }
}
