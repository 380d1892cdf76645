// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-key sliding-window rate limiter.
//!
//! Each key keeps the timestamps of its requests inside the window; a
//! request is allowed while the count is under the limit. The outcome
//! carries the `X-RateLimit-*` header values.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest hit leaves the window.
    pub reset_secs: u64,
}

/// Sliding-window limiter over arbitrary string keys.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests, hits: Mutex::new(HashMap::new()) }
    }

    /// Record a request for `key` and report the outcome.
    pub fn check(&self, key: &str) -> RateStatus {
        let now = Instant::now();
        let mut hits = match self.hits.lock() {
            Ok(hits) => hits,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = hits.entry(key.to_string()).or_default();

        while entry.front().is_some_and(|&t| now.duration_since(t) >= self.window) {
            entry.pop_front();
        }

        let reset_secs = entry
            .front()
            .map_or(0, |&oldest| self.window.saturating_sub(now.duration_since(oldest)).as_secs());

        if entry.len() >= self.max_requests as usize {
            return RateStatus {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_secs,
            };
        }

        entry.push_back(now);
        RateStatus {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - entry.len() as u32,
            reset_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert!(limiter.check("k").allowed);
        assert!(limiter.check("k").allowed);
        let third = limiter.check("k");
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(!limiter.check("k").allowed);
    }

    #[test]
    fn test_keys_are_independent(){
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        assert!(limiter.check("k").allowed);
        assert!(!limiter.check("k").allowed);
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("k").allowed);
    }

    #[test]
    fn test_denied_requests_do_not_consume_budget() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 2);
        assert!(limiter.check("k").allowed);
        assert!(limiter.check("k").allowed);
        for _ in 0..10 {
            assert!(!limiter.check("k").allowed);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check("k").allowed);
    }
}
