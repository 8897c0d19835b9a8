//! Lockout policy for repeated login failures.
//!
//! The counters live in the `users` table; this module only decides. A locked
//! account is never unlocked proactively: the next login attempt re-evaluates
//! `locked_until` against the clock.

use chrono::{DateTime, Duration, Utc};

/// Failed attempts before the account locks.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// How long a lock lasts once the threshold is reached.
pub const LOCK_DURATION_MINUTES: i64 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: DateTime<Utc> },
}

impl LockState {
    /// Evaluate the stored lock timestamp against `now`.
    ///
    /// An expired lock reads as `Unlocked`; the stale row is cleaned up on the
    /// next successful login, not here.
    #[must_use]
    pub fn evaluate(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match locked_until {
            Some(until) if until > now => Self::Locked { until },
            _ => Self::Unlocked,
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Seconds until the lock expires, for the `Retry-After` hint.
    #[must_use]
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Self::Locked { until } => Some((*until - now).num_seconds().max(0)),
            Self::Unlocked => None,
        }
    }
}

/// Lock expiry for a failure that brings the counter to `attempts`.
///
/// Returns `None` while the counter is below the threshold.
#[must_use]
pub fn lock_for_attempts(attempts: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if attempts >= MAX_FAILED_ATTEMPTS {
        Some(now + Duration::minutes(LOCK_DURATION_MINUTES))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_timestamp_is_unlocked() {
        let now = Utc::now();
        assert_eq!(LockState::evaluate(None, now), LockState::Unlocked);
    }

    #[test]
    fn future_timestamp_is_locked() {
        let now = Utc::now();
        let until = now + Duration::minutes(5);
        let state = LockState::evaluate(Some(until), now);
        assert_eq!(state, LockState::Locked { until });
        assert!(state.is_locked());
    }

    #[test]
    fn past_timestamp_reads_unlocked() {
        let now = Utc::now();
        let state = LockState::evaluate(Some(now - Duration::seconds(1)), now);
        assert_eq!(state, LockState::Unlocked);
        assert!(!state.is_locked());
    }

    #[test]
    fn exact_expiry_reads_unlocked() {
        // now >= locked_until means the lock is over.
        let now = Utc::now();
        assert_eq!(LockState::evaluate(Some(now), now), LockState::Unlocked);
    }

    #[test]
    fn retry_after_counts_down() {
        let now = Utc::now();
        let state = LockState::evaluate(Some(now + Duration::seconds(90)), now);
        assert_eq!(state.retry_after_seconds(now), Some(90));
        assert_eq!(LockState::Unlocked.retry_after_seconds(now), None);
    }

    #[test]
    fn lock_engages_at_threshold() {
        let now = Utc::now();
        for attempts in 1..MAX_FAILED_ATTEMPTS {
            assert_eq!(lock_for_attempts(attempts, now), None);
        }
        let until = lock_for_attempts(MAX_FAILED_ATTEMPTS, now);
        assert_eq!(until, Some(now + Duration::minutes(LOCK_DURATION_MINUTES)));
    }
}
