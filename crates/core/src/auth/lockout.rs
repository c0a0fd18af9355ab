//! Failed-login counting and temporary account lockout.

use chrono::{DateTime, Duration, Utc};

use super::User;

/// How many consecutive failures lock an account, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

/// Result of recording a failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailureOutcome {
    /// The account stays usable; `remaining` attempts before lockout.
    Counted { remaining: u32 },
    /// This failure locked the account.
    Locked { until: DateTime<Utc> },
}

/// Returns true while the account is locked.
pub fn is_locked(user: &User, now: DateTime<Utc>) -> bool {
    user.locked_until.is_some_and(|until| until > now)
}

/// Records a failed login on the user.
///
/// Reaching the maximum locks the account and resets the counter so the
/// next window starts fresh once the lock expires.
pub fn register_failed_login(
    user: &mut User,
    now: DateTime<Utc>,
    policy: &LockoutPolicy,
) -> LoginFailureOutcome {
    user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
    user.updated_at = now;

    if user.failed_login_attempts >= policy.max_failed_attempts {
        let until = now + policy.lockout_duration;
        user.locked_until = Some(until);
        user.failed_login_attempts = 0;
        LoginFailureOutcome::Locked { until }
    } else {
        LoginFailureOutcome::Counted {
            remaining: policy.max_failed_attempts - user.failed_login_attempts,
        }
    }
}

/// Clears the failure counter and lock after a successful login.
pub fn register_successful_login(user: &mut User, now: DateTime<Utc>) {
    user.failed_login_attempts = 0;
    user.locked_until = None;
    user.last_login_at = Some(now);
    user.updated_at = now;
}

/// Clears a lock by administrator action.
pub fn unlock(user: &mut User, now: DateTime<Utc>) {
    user.failed_login_attempts = 0;
    user.locked_until = None;
    user.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: 3,
            lockout_duration: Duration::minutes(10),
        }
    }

    #[test]
    fn failures_below_limit_are_counted() {
        let now = Utc::now();
        let mut user = User::new("alice", "hash");

        assert_eq!(
            register_failed_login(&mut user, now, &policy()),
            LoginFailureOutcome::Counted { remaining: 2 }
        );
        assert_eq!(
            register_failed_login(&mut user, now, &policy()),
            LoginFailureOutcome::Counted { remaining: 1 }
        );
        assert_eq!(user.failed_login_attempts, 2);
        assert!(!is_locked(&user, now));
    }

    #[test]
    fn reaching_limit_locks_and_resets_counter() {
        let now = Utc::now();
        let mut user = User::new("alice", "hash");
        user.failed_login_attempts = 2;

        let outcome = register_failed_login(&mut user, now, &policy());

        assert_eq!(
            outcome,
            LoginFailureOutcome::Locked {
                until: now + Duration::minutes(10)
            }
        );
        assert_eq!(user.failed_login_attempts, 0);
        assert!(is_locked(&user, now));
        assert!(is_locked(&user, now + Duration::minutes(9)));
        assert!(!is_locked(&user, now + Duration::minutes(10)));
    }

    #[test]
    fn success_clears_state() {
        let now = Utc::now();
        let mut user = User::new("alice", "hash");
        user.failed_login_attempts = 2;
        user.locked_until = Some(now - Duration::minutes(1));

        register_successful_login(&mut user, now);

        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
        assert_eq!(user.last_login_at, Some(now));
    }

    #[test]
    fn unlock_clears_lock_without_touching_last_login() {
        let now = Utc::now();
        let mut user = User::new("alice", "hash");
        user.locked_until = Some(now + Duration::minutes(5));

        unlock(&mut user, now);

        assert!(!is_locked(&user, now));
        assert!(user.last_login_at.is_none());
    }

    #[test]
    fn default_policy_is_five_attempts_fifteen_minutes() {
        let p = LockoutPolicy::default();
        assert_eq!(p.max_failed_attempts, 5);
        assert_eq!(p.lockout_duration, Duration::minutes(15));
    }
}
