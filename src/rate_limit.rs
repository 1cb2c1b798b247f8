use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::config::{DEFAULT_MAX_ENTRIES, RateLimitConfig};
use crate::metrics::WINDOWS_TRACKED;
use crate::models::RateLimitDecision;

// Rate limit window - tracks requests per IP/key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub count: u32,
    pub reset_at: i64, // epoch millis
}

impl Window {
    fn fresh(now: i64, config: &RateLimitConfig) -> Self {
        Self {
            count: 1,
            reset_at: now.saturating_add(config.window_ms.min(i64::MAX as u64) as i64),
        }
    }

    // The boundary itself belongs to the next window
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.reset_at
    }
}

/// Identity key -> counting window.
///
/// Plain data structure: it has no per-key ordering of its own. Callers that
/// need "no lost increments" go through [`crate::serializer::KeySerializer`].
///
/// The entry count is tracked separately so the capacity check and `len()`
/// never lock every shard.
#[derive(Debug)]
pub struct WindowStore {
    windows: DashMap<String, Window>,
    entries: AtomicUsize,
    max_entries: usize,
}

// Windows inspected per eviction at capacity
const EVICTION_SAMPLE: usize = 16;

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStore {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            windows: DashMap::new(),
            entries: AtomicUsize::new(0),
            max_entries: max_entries.max(1),
        }
    }

    /// Fixed window admission for `key` at time `now`.
    ///
    /// A missing or expired window is replaced by a fresh one that already
    /// counts this call. A full window rejects without consuming quota.
    pub fn admit(&self, key: &str, config: &RateLimitConfig, now: i64) -> RateLimitDecision {
        let limit = config.max_requests;

        if let Some(mut window) = self.windows.get_mut(key) {
            if window.is_expired(now) {
                *window = Window::fresh(now, config);
                debug!(key, reset_at = window.reset_at, "rate limit window renewed");
                return RateLimitDecision::admitted(limit, limit.saturating_sub(1), window.reset_at);
            }

            if window.count >= limit {
                return RateLimitDecision::rejected(limit, window.reset_at);
            }

            window.count += 1;
            return RateLimitDecision::admitted(limit, limit - window.count, window.reset_at);
        }

        self.reserve_slot(now);

        let window = Window::fresh(now, config);
        if self.windows.insert(key.to_string(), window).is_some() {
            // another caller inserted the key meanwhile; it already holds a slot
            self.entries.fetch_sub(1, Ordering::AcqRel);
        }
        WINDOWS_TRACKED.set(self.len() as i64);
        debug!(key, reset_at = window.reset_at, "rate limit window opened");
        RateLimitDecision::admitted(limit, limit.saturating_sub(1), window.reset_at)
    }

    // Count the new entry up front, then evict until the store is back under
    // `max_entries`. Concurrent inserts each evict for themselves, so the
    // count never settles above the cap.
    fn reserve_slot(&self, now: i64) {
        let mut total = self.entries.fetch_add(1, Ordering::AcqRel) + 1;
        while total > self.max_entries {
            if !self.evict_one(now) {
                break;
            }
            total = self.entries.load(Ordering::Acquire);
        }
    }

    // Evict from a bounded sample: an expired window if one is seen, else the
    // one closest to expiry. Never scans the whole store.
    fn evict_one(&self, now: i64) -> bool {
        let victim = {
            let mut best: Option<(String, i64)> = None;
            for entry in self.windows.iter().take(EVICTION_SAMPLE) {
                let reset_at = entry.value().reset_at;
                if best.as_ref().is_none_or(|(_, r)| reset_at < *r) {
                    best = Some((entry.key().clone(), reset_at));
                }
                if reset_at <= now {
                    break;
                }
            }
            best
        };

        let Some((key, reset_at)) = victim else {
            return false;
        };
        if self.windows.remove(&key).is_some() {
            self.entries.fetch_sub(1, Ordering::AcqRel);
            WINDOWS_TRACKED.set(self.len() as i64);
            debug!(key = %key, expired = reset_at <= now, "evicted rate limit window at capacity");
        }
        true
    }

    /// Remove every window with `reset_at <= now`. Returns how many were dropped.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.entries.fetch_sub(removed, Ordering::AcqRel);
        WINDOWS_TRACKED.set(self.len() as i64);
        removed
    }

    pub fn get(&self, key: &str) -> Option<Window> {
        self.windows.get(key).map(|w| *w)
    }

    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.windows.clear();
        self.entries.store(0, Ordering::Release);
        WINDOWS_TRACKED.set(0);
    }
}
