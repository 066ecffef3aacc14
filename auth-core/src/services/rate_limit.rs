//! Sliding-window limiter for failed verification attempts.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

use super::error::AuthError;

/// Counts attempts per key inside a sliding window. An attempt stays counted
/// until it ages out or a success clears the key.
#[derive(Debug)]
pub struct AttemptLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl AttemptLimiter {
    pub fn new(max_attempts: u32, window_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts as usize,
            window: Duration::milliseconds(window_ms as i64),
            attempts: DashMap::new(),
        }
    }

    /// Count an attempt against `key`, failing with `RateLimitExceeded` once
    /// the window is full. Check and record happen under one entry lock; a
    /// rejected attempt is not recorded.
    pub fn try_acquire(&self, key: &str) -> Result<(), AuthError> {
        self.try_acquire_at(key, Utc::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut entry = self.attempts.entry(key.to_string()).or_default();
        prune(&mut entry, now - self.window);

        if entry.len() >= self.max_attempts {
            let oldest = entry.front().copied().unwrap_or(now);
            let remaining = (oldest + self.window - now).num_milliseconds().max(0);
            // Round up so callers never retry a moment too early.
            let retry_after_secs = ((remaining + 999) / 1000).max(1) as u64;
            return Err(AuthError::RateLimitExceeded { retry_after_secs });
        }

        entry.push_back(now);
        Ok(())
    }

    /// Forget every attempt for `key`. Called after a success.
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Attempts currently counted inside the window.
    pub fn attempts(&self, key: &str) -> usize {
        let cutoff = Utc::now() - self.window;
        self.attempts
            .get(key)
            .map(|entry| entry.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0)
    }
}

fn prune(entry: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while entry.front().is_some_and(|t| *t <= cutoff) {
        entry.pop_front();
    }
}
