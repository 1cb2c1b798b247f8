use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{LocalLimiter, RateLimitBackend};
use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::metrics::FALLBACKS;
use crate::models::RateLimitDecision;

/// Development wiring: ask the remote store, and when it fails count locally
/// instead of blocking the developer.
///
/// Never used in production, where a remote failure must reach the caller.
pub struct FallbackBackend {
    primary: Arc<dyn RateLimitBackend>,
    fallback: LocalLimiter,
}

impl FallbackBackend {
    pub fn new(primary: Arc<dyn RateLimitBackend>, fallback: LocalLimiter) -> Self {
        Self { primary, fallback }
    }

    pub fn local(&self) -> &LocalLimiter {
        &self.fallback
    }
}

#[async_trait]
impl RateLimitBackend for FallbackBackend {
    async fn admit(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision> {
        match self.primary.admit(key, config).await {
            Ok(decision) => Ok(decision),
            Err(e) => {
                warn!(
                    backend = self.primary.name(),
                    error = %e,
                    "rate limit backend failed, falling back to in-memory limiter"
                );
                FALLBACKS.inc();
                Ok(self.fallback.check(key, config).await)
            }
        }
    }

    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn reset(&self) {
        self.primary.reset();
        self.fallback.clear();
    }
}
