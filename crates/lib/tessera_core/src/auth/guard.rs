//! Lockout and login throttling.
//!
//! Two independent defences against credential stuffing:
//! - account lockout, persisted on the admin row: `threshold` consecutive
//!   failures lock the account for `duration`;
//! - an in-process sliding-window throttle keyed by client IP and by email,
//!   which applies whether or not the account exists or is locked.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::auth::AdminRecord;

/// Failures before an admin account locks.
pub const DEFAULT_LOCKOUT_THRESHOLD: i32 = 5;

/// Lock length: 15 minutes.
pub const DEFAULT_LOCKOUT_DURATION_SECS: i64 = 15 * 60;

/// Attempts allowed per IP and per email inside one throttle window.
pub const DEFAULT_THROTTLE_MAX_ATTEMPTS: u32 = 20;

/// Throttle window: 15 minutes.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Admin lockout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: i32,
    pub duration: chrono::Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOCKOUT_THRESHOLD,
            duration: chrono::Duration::seconds(DEFAULT_LOCKOUT_DURATION_SECS),
        }
    }
}

impl LockoutPolicy {
    /// Remaining lock time, if the account is locked at `now`.
    pub fn remaining_lock(
        &self,
        admin: &AdminRecord,
        now: DateTime<Utc>,
    ) -> Option<chrono::Duration> {
        admin
            .locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Counter and lock state after one more failure at `now`.
    ///
    /// A lock that has already expired starts a fresh count, so an account
    /// coming out of lockout gets the full threshold again.
    pub fn after_failure(
        &self,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> (i32, Option<DateTime<Utc>>) {
        let lock_expired = locked_until.is_some_and(|until| until <= now);
        let base = if lock_expired { 0 } else { failed_attempts.max(0) };
        let attempts = base + 1;
        if attempts >= self.threshold {
            (attempts, Some(now + self.duration))
        } else {
            (attempts, locked_until.filter(|_| !lock_expired))
        }
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Sliding-window attempt counter keyed by IP and by email.
#[derive(Debug)]
pub struct LoginThrottle {
    max_attempts: u32,
    window: Duration,
    attempts: DashMap<String, VecDeque<Instant>>,
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_MAX_ATTEMPTS, DEFAULT_THROTTLE_WINDOW)
    }
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: DashMap::new(),
        }
    }

    /// Check both keys and, if neither is over the limit, count the attempt
    /// against both.
    pub fn check_and_register(&self, ip: Option<&str>, email: &str) -> ThrottleDecision {
        let now = Instant::now();
        let keys: Vec<String> = ip
            .map(|ip| format!("ip:{ip}"))
            .into_iter()
            .chain(std::iter::once(format!("email:{email}")))
            .collect();

        for key in &keys {
            if let Some(retry_after) = self.retry_after(key, now) {
                return ThrottleDecision::Limited { retry_after };
            }
        }
        for key in keys {
            self.attempts.entry(key).or_default().push_back(now);
        }
        ThrottleDecision::Allowed
    }

    /// Forget the email's attempts after a successful login.
    pub fn clear_email(&self, email: &str) {
        self.attempts.remove(&format!("email:{email}"));
    }

    /// Drop keys whose attempts have all aged out.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.attempts.retain(|_, seen| {
            while seen
                .front()
                .is_some_and(|t| now.duration_since(*t) >= window)
            {
                seen.pop_front();
            }
            !seen.is_empty()
        });
    }

    fn retry_after(&self, key: &str, now: Instant) -> Option<Duration> {
        let mut seen = self.attempts.get_mut(key)?;
        while seen
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            seen.pop_front();
        }
        if seen.len() < self.max_attempts as usize {
            return None;
        }
        let oldest = seen.front().copied()?;
        Some(self.window.saturating_sub(now.duration_since(oldest)))
    }
}
