//! Authentication session bookkeeping
//!
//! The wallbox ties a login to the TCP connection it arrived on. This module
//! keeps the client side view of that: whether we believe the connection is
//! authenticated, whether the user asked us to stay logged out, and a sliding
//! window limiting how often we try to log in.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter for login attempts
#[derive(Debug, Clone)]
pub struct LoginRateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: VecDeque<Instant>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            attempts: VecDeque::with_capacity(max_attempts),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.attempts.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record an attempt at `now` if the window still has room.
    ///
    /// A refused attempt is not recorded, so a caller hammering a locked-out
    /// limiter does not extend the lockout.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.attempts.len() >= self.max_attempts {
            return false;
        }
        self.attempts.push_back(now);
        true
    }

    /// Attempts still counted against the window
    pub fn attempts_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.attempts.len()
    }

    /// When the next attempt becomes possible, if currently locked out
    pub fn locked_out_until(&mut self, now: Instant) -> Option<Instant> {
        self.prune(now);
        if self.attempts.len() < self.max_attempts {
            return None;
        }
        self.attempts.front().map(|oldest| *oldest + self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Client side view of the device session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Connection believed to be logged in
    pub authenticated: bool,
    /// Set by logout; suppresses all requests until the next login
    pub keep_logout: bool,
    /// Last login/logout transition
    pub last_updated: Option<DateTime<Utc>>,
    pub limiter: LoginRateLimiter,
}

impl SessionState {
    pub fn new(limiter: LoginRateLimiter) -> Self {
        Self {
            authenticated: false,
            keep_logout: false,
            last_updated: None,
            limiter,
        }
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
        self.last_updated = Some(Utc::now());
    }

    pub fn mark_unauthenticated(&mut self) {
        self.authenticated = false;
    }

    pub fn mark_logged_out(&mut self) {
        self.authenticated = false;
        self.last_updated = Some(Utc::now());
    }
}
