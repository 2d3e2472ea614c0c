use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Too many failed login attempts within the window")]
pub struct RateLimited;

/// Sliding-window counter of failed logins, keyed by client (usually the
/// peer address).
///
/// Every mutation of a window happens while holding that key's map entry.
/// An attempt is reserved before the credentials are checked, so a burst of
/// concurrent logins from one client gets at most `max_attempts` checks.
pub struct LoginRateLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    max_attempts: usize,
    window: TimeDelta,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: TimeDelta) -> Self {
        Self {
            windows: DashMap::new(),
            max_attempts,
            window,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// True when `client_key` has used up its failed attempts within the
    /// window ending at `now`. Stale timestamps are pruned as a side effect;
    /// nothing is recorded.
    pub fn is_limited(&self, client_key: &str, now: DateTime<Utc>) -> bool {
        self.attempts(client_key, now) >= self.max_attempts
    }

    /// Number of failed attempts still inside the window.
    pub fn attempts(&self, client_key: &str, now: DateTime<Utc>) -> usize {
        let remaining = match self.windows.get_mut(client_key) {
            Some(mut attempts) => {
                prune(&mut attempts, now - self.window);
                attempts.len()
            }
            None => return 0,
        };
        if remaining == 0 {
            self.windows.remove_if(client_key, |_, attempts| attempts.is_empty());
        }
        remaining
    }

    /// Counts an attempt against `client_key` unless its window is already
    /// full. Prune, check and push happen under one entry lock. Returns the
    /// number of attempts in the window including this one.
    pub fn try_reserve(&self, client_key: &str, now: DateTime<Utc>) -> Result<usize, RateLimited> {
        let mut attempts = self.windows.entry(client_key.to_string()).or_default();
        prune(&mut attempts, now - self.window);
        if attempts.len() >= self.max_attempts {
            return Err(RateLimited);
        }
        attempts.push_back(now);
        let count = attempts.len();
        debug!(client = %client_key, count, "Reserved login attempt.");
        Ok(count)
    }

    /// Forgets every attempt for `client_key`.
    pub fn clear(&self, client_key: &str) {
        self.windows.remove(client_key);
    }

    /// Drops windows whose attempts have all expired. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.windows.len();
        self.windows.retain(|_, attempts| {
            prune(attempts, cutoff);
            !attempts.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn prune(attempts: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while attempts.front().is_some_and(|ts| *ts <= cutoff) {
        attempts.pop_front();
    }
}
