//! Sliding-window rate limiting
//!
//! In-process counter keyed by an arbitrary string (typically a user id
//! or `action_user` pair). Windows are pruned lazily on access; there is
//! no background sweeper. The limiter is an explicitly constructed
//! component owned by the composition root, never ambient global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for the limiter, injectable for tests
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds
    fn now_millis(&self) -> u64;
}

/// Wall-clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<u64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Mutex::new(start_millis),
        }
    }

    /// Move time forward
    pub fn advance_secs(&self, secs: u64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += secs * 1000;
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Request timestamps for one throttled key
struct Window {
    /// Accepted-request instants (millis), oldest first
    hits: Vec<u64>,
}

/// Sliding-window request limiter
///
/// `is_allowed` performs the purge-check-append sequence under a single
/// lock, so two concurrent calls at the boundary cannot both take the
/// last slot. State is process-lifetime only; a multi-instance deployment
/// needs an external shared counter instead.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    clock: Arc<dyn Clock>,

    /// Soft cap on tracked keys; exceeding it triggers an idle-key sweep
    max_keys: usize,
}

const DEFAULT_MAX_KEYS: usize = 10_000;

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiter {
    /// Create a limiter on the given clock with the default key cap
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_max_keys(clock, DEFAULT_MAX_KEYS)
    }

    /// Create a limiter with an explicit bound on tracked keys
    pub fn with_max_keys(clock: Arc<dyn Clock>, max_keys: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
            max_keys,
        }
    }

    /// Check the window for `key` and record the request if allowed
    ///
    /// Purges entries older than `window_secs`, rejects when the live
    /// count has reached `limit` (no timestamp is recorded on rejection),
    /// otherwise appends the current instant and allows.
    pub fn is_allowed(&self, key: &str, limit: usize, window_secs: u64) -> bool {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(window_secs * 1000);

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > self.max_keys && !windows.contains_key(key) {
            Self::evict_idle(&mut windows, cutoff);
        }

        let window = windows.entry(key.to_string()).or_insert(Window { hits: Vec::new() });
        window.hits.retain(|&t| t >= cutoff);

        if window.hits.len() >= limit {
            return false;
        }

        window.hits.push(now);
        true
    }

    /// Remaining allowance for `key` without recording a request
    pub fn remaining(&self, key: &str, limit: usize, window_secs: u64) -> usize {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(window_secs * 1000);

        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let live = windows
            .get(key)
            .map(|w| w.hits.iter().filter(|&&t| t >= cutoff).count())
            .unwrap_or(0);

        limit.saturating_sub(live)
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop keys whose every recorded hit has left the current window
    ///
    /// The cutoff passed in belongs to the triggering call's window; keys
    /// throttled on longer windows may be evicted early, which only costs
    /// them a fresh (empty) window on their next request.
    fn evict_idle(windows: &mut HashMap<String, Window>, cutoff: u64) {
        let before = windows.len();
        windows.retain(|_, w| w.hits.iter().any(|&t| t >= cutoff));

        let evicted = before - windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = windows.len(), "Evicted idle limiter keys");
        }
    }
}
