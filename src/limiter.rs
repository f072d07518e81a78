// src/limiter.rs

//! Rate-limit snapshot tracking.
//!
//! The limiter holds the single most recent quota snapshot observed from
//! the upstream API. Responses can arrive out of order from concurrent
//! execution paths, so a snapshot only replaces the held one when it was
//! observed strictly later.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A point-in-time capture of remaining quota and reset time.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSnapshot {
    pub observed_at: DateTime<Utc>,
    pub used: u32,
    pub remaining: u32,
    pub reset_secs: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    pub fn new(observed_at: DateTime<Utc>, used: u32, remaining: u32, reset_secs: u32) -> Self {
        Self {
            observed_at,
            used,
            remaining,
            reset_secs,
            reset_at: observed_at + chrono::Duration::seconds(reset_secs as i64),
        }
    }
}

impl fmt::Display for RateLimitSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used: {}, remaining: {}, reset: {}",
            self.used, self.remaining, self.reset_secs
        )
    }
}

/// Tracks the freshest rate-limit snapshot across concurrent tasks.
///
/// Updates and reads share one lock so a reader never observes a
/// half-written snapshot.
#[derive(Debug, Default)]
pub struct RateLimiter {
    current: Mutex<Option<RateLimitSnapshot>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held snapshot iff the new one was observed strictly later.
    pub fn observe(&self, snapshot: RateLimitSnapshot) {
        let mut current = self.current.lock().expect("rate limit lock poisoned");

        let Some(held) = current.as_ref() else {
            log::info!("First rate limit: {snapshot}");
            *current = Some(snapshot);
            return;
        };

        if held.observed_at >= snapshot.observed_at {
            return;
        }

        if snapshot.remaining == 0 {
            log::info!(
                "Used all limits, approximately {} seconds until reset.",
                snapshot.reset_secs
            );
        } else if held.remaining == 0 {
            log::info!("Limits reset after {}.", snapshot);
        }

        *current = Some(snapshot);
    }

    /// A copy of the held snapshot, if any.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        self.current
            .lock()
            .expect("rate limit lock poisoned")
            .clone()
    }

    /// Whether requests are currently blocked by quota exhaustion.
    pub fn is_blocked(&self) -> bool {
        self.blocked_for().is_some()
    }

    /// Time left until the quota resets, when blocked.
    pub fn blocked_for(&self) -> Option<Duration> {
        let current = self.current.lock().expect("rate limit lock poisoned");
        let held = current.as_ref()?;
        if held.remaining > 0 {
            return None;
        }
        (held.reset_at - Utc::now()).to_std().ok()
    }
}
