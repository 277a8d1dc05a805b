//! Per-symbol cooldown and rate-limit state
//!
//! Checks are read-only; state is only written by `commit` once a signal has
//! passed every stage. A per-symbol async lock serialises evaluation of
//! same-symbol signals while different symbols proceed concurrently.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::filter::types::{CheckPolicy, CheckResult};

/// Cooldown entries older than this are dropped on reset
const COOLDOWN_RETENTION_HOURS: i64 = 1;

/// Expired entries are swept once every this many commits
const PRUNE_EVERY_COMMITS: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Cooldown timestamps and rate-limit counters keyed by symbol
pub struct SymbolState {
    cooldown: Duration,
    window: Duration,
    max_per_window: u32,
    last_accepted: DashMap<String, DateTime<Utc>>,
    windows: DashMap<String, RateWindow>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    commits: AtomicU64,
}

impl SymbolState {
    pub fn new(cooldown_secs: u64, window_secs: u64, max_per_window: u32) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs as i64),
            window: Duration::seconds(window_secs as i64),
            max_per_window,
            last_accepted: DashMap::new(),
            windows: DashMap::new(),
            locks: DashMap::new(),
            commits: AtomicU64::new(0),
        }
    }

    /// Acquire the evaluation lock for a symbol
    pub async fn lock(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn check_cooldown(&self, symbol: &str, at: DateTime<Utc>) -> CheckResult {
        let Some(last) = self.last_accepted.get(symbol).map(|t| *t.value()) else {
            return CheckResult::pass("cooldown", 1.0, "no prior signal");
        };

        let elapsed = at.signed_duration_since(last);
        if elapsed < self.cooldown {
            return CheckResult::fail(
                "cooldown",
                format!(
                    "cooldown active: {}s since last signal, window {}s",
                    elapsed.num_seconds(),
                    self.cooldown.num_seconds()
                ),
            )
            .with_metric("elapsed_secs", elapsed.num_seconds() as f64);
        }

        CheckResult::pass("cooldown", 1.0, "cooldown elapsed")
            .with_metric("elapsed_secs", elapsed.num_seconds() as f64)
    }

    pub fn check_rate_limit(&self, symbol: &str, at: DateTime<Utc>) -> CheckResult {
        let count = self
            .windows
            .get(symbol)
            .filter(|w| at.signed_duration_since(w.started_at) < self.window)
            .map(|w| w.count)
            .unwrap_or(0);

        let result = if count >= self.max_per_window {
            CheckResult::fail(
                "rate_limit",
                format!(
                    "rate limit reached: {}/{} signals in {}s window",
                    count,
                    self.max_per_window,
                    self.window.num_seconds()
                ),
            )
        } else {
            CheckResult::pass("rate_limit", 1.0, format!("{}/{} in window", count, self.max_per_window))
        };

        result
            .with_policy(CheckPolicy::FailClosed)
            .with_metric("window_count", count as f64)
    }

    /// Record an accepted signal
    pub fn commit(&self, symbol: &str, at: DateTime<Utc>) {
        self.last_accepted.insert(symbol.to_string(), at);

        {
            let mut entry = self.windows.entry(symbol.to_string()).or_insert(RateWindow {
                started_at: at,
                count: 0,
            });
            if at.signed_duration_since(entry.started_at) >= self.window {
                entry.started_at = at;
                entry.count = 0;
            }
            entry.count += 1;
        }

        if (self.commits.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY_COMMITS == 0 {
            self.prune_expired(at);
        }
    }

    /// Drop entries that can no longer affect a check at `now`, and locks
    /// nobody holds. Must not be called while holding a map reference.
    pub fn prune_expired(&self, now: DateTime<Utc>) {
        let before = self.locks.len();
        self.last_accepted
            .retain(|_, last| now.signed_duration_since(*last) < self.cooldown);
        self.windows
            .retain(|_, w| now.signed_duration_since(w.started_at) < self.window);
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        debug!(
            locks_pruned = before - self.locks.len(),
            cooldowns = self.last_accepted.len(),
            windows = self.windows.len(),
            "Expired symbol state pruned"
        );
    }

    /// Last accepted timestamp for a symbol
    pub fn last_accepted(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_accepted.get(symbol).map(|t| *t.value())
    }

    /// Clear rate-limit windows and prune stale cooldown entries
    pub fn reset(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(COOLDOWN_RETENTION_HOURS);
        let before = self.last_accepted.len();
        self.last_accepted.retain(|_, last| *last >= cutoff);
        self.windows.clear();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        debug!(
            pruned = before - self.last_accepted.len(),
            retained = self.last_accepted.len(),
            "Symbol state reset"
        );
    }
}
