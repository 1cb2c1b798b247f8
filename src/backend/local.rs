use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::RateLimitBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_MAX_ENTRIES, RateLimitConfig};
use crate::error::Result;
use crate::models::RateLimitDecision;
use crate::rate_limit::WindowStore;
use crate::reaper::{DEFAULT_SWEEP_INTERVAL, LazyReaper};
use crate::serializer::KeySerializer;

/// In-process limiter: window store, per-key serializer and lazy reaper
/// owned by one instance.
///
/// Performs no I/O, so admission never fails.
#[derive(Debug)]
pub struct LocalLimiter {
    store: WindowStore,
    serializer: KeySerializer,
    reaper: LazyReaper,
    clock: Arc<dyn Clock>,
}

impl Default for LocalLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(clock, DEFAULT_SWEEP_INTERVAL, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_settings(clock: Arc<dyn Clock>, sweep_interval: Duration, max_entries: usize) -> Self {
        let now = clock.now_millis();
        Self {
            store: WindowStore::with_max_entries(max_entries),
            serializer: KeySerializer::new(),
            reaper: LazyReaper::new(sweep_interval, now),
            clock,
        }
    }

    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.reaper.maybe_sweep(&self.store, self.clock.now_millis());

        // time is read inside the turn so same-key decisions see ordered clocks
        self.serializer
            .run(key, || self.store.admit(key, config, self.clock.now_millis()))
            .await
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    pub fn serializer(&self) -> &KeySerializer {
        &self.serializer
    }

    /// Clear every window and pending slot. Must not race live traffic.
    pub fn clear(&self) {
        self.store.clear();
        self.serializer.clear();
        self.reaper.reset(self.clock.now_millis());
    }
}

#[async_trait]
impl RateLimitBackend for LocalLimiter {
    async fn admit(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision> {
        Ok(self.check(key, config).await)
    }

    fn name(&self) -> &'static str {
        "local"
    }

    fn reset(&self) {
        self.clear();
    }
}
