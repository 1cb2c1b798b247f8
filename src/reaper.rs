use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::metrics::WINDOWS_REAPED;
use crate::rate_limit::WindowStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Sweeps expired windows out of a [`WindowStore`], piggybacked on traffic.
///
/// There is no timer: every admit call asks [`LazyReaper::maybe_sweep`], and a
/// sweep only happens once more than `interval` has passed since the last one.
/// With no traffic nothing is swept, so the store holds at most the identities
/// seen since the last sweep (further bounded by the store's entry cap).
#[derive(Debug)]
pub struct LazyReaper {
    interval_ms: i64,
    last_sweep: AtomicI64,
}

impl LazyReaper {
    pub fn new(interval: Duration, now: i64) -> Self {
        Self {
            interval_ms: interval.as_millis().min(i64::MAX as u128) as i64,
            last_sweep: AtomicI64::new(now),
        }
    }

    // Returns how many windows were dropped, or None if it wasn't time yet
    // (or another caller is already sweeping)
    pub fn maybe_sweep(&self, store: &WindowStore, now: i64) -> Option<usize> {
        let last = self.last_sweep.load(Ordering::Acquire);
        if now.saturating_sub(last) <= self.interval_ms {
            return None;
        }

        // one winner per interval
        self.last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let removed = store.purge_expired(now);
        WINDOWS_REAPED.inc_by(removed as u64);
        debug!(removed, remaining = store.len(), "swept expired rate limit windows");
        Some(removed)
    }

    pub fn reset(&self, now: i64) {
        self.last_sweep.store(now, Ordering::Release);
    }
}
