use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::backend::{FallbackBackend, LocalLimiter, RateLimitBackend, RestCounterBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, LimiterArgs, RateLimitConfig};
use crate::error::Result;
use crate::metrics::{DECISION_LATENCY, DECISIONS};
use crate::models::RateLimitDecision;

/// Shared limiter handle. Build one when composing the application and hand
/// clones to request handlers; all clones share the same counters.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::local()
    }
}

impl RateLimiter {
    /// In-process limiter with default sweep interval and entry cap.
    pub fn local() -> Self {
        Self::with_backend(Arc::new(LocalLimiter::new()))
    }

    pub fn with_backend(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { backend }
    }

    pub fn from_args(args: &LimiterArgs) -> Result<Self> {
        Self::from_args_with_clock(args, Arc::new(SystemClock))
    }

    /// Pick the backend once, from configuration.
    ///
    /// Remote in production fails closed: a misconfigured or unreachable store
    /// is an error, never a silent pass. Remote in development falls back to
    /// local counting.
    pub fn from_args_with_clock(args: &LimiterArgs, clock: Arc<dyn Clock>) -> Result<Self> {
        let local = move || LocalLimiter::with_settings(clock, args.sweep_interval(), args.max_entries);

        let backend: Arc<dyn RateLimitBackend> = match args.backend {
            BackendKind::Local => {
                info!(max_entries = args.max_entries, sweep_secs = args.sweep_secs, "rate limiter using in-memory backend");
                Arc::new(local())
            }
            BackendKind::Remote if args.environment.is_production() => {
                let remote = RestCounterBackend::from_args(args)?;
                info!(url = %remote.url(), "rate limiter using remote backend (fail-closed)");
                Arc::new(remote)
            }
            BackendKind::Remote => match RestCounterBackend::from_args(args) {
                Ok(remote) => {
                    info!(url = %remote.url(), "rate limiter using remote backend with in-memory fallback");
                    Arc::new(FallbackBackend::new(Arc::new(remote), local()))
                }
                Err(e) => {
                    warn!(error = %e, "remote rate limit backend unavailable, using in-memory backend");
                    Arc::new(local())
                }
            },
        };

        Ok(Self { backend })
    }

    /// Count one call from `identifier` against `config`.
    ///
    /// A rejection is `Ok` with `success == false`. `Err` only means no
    /// decision could be made (remote store down in production).
    pub async fn check_rate_limit(&self, identifier: &str, config: &RateLimitConfig) -> Result<RateLimitDecision> {
        let start_time = Instant::now();
        let result = self.backend.admit(identifier, config).await;
        DECISION_LATENCY.observe(start_time.elapsed().as_secs_f64());

        match &result {
            Ok(decision) => {
                let outcome = if decision.success { "admitted" } else { "rejected" };
                DECISIONS.with_label_values(&[self.backend.name(), outcome]).inc();
            }
            Err(e) => {
                DECISIONS.with_label_values(&[self.backend.name(), "error"]).inc();
                error!(backend = self.backend.name(), error = %e, "rate limit decision failed");
            }
        }
        result
    }

    /// Clear all process-local limiter state. Test hook; must not race live
    /// traffic.
    pub fn reset(&self) {
        self.backend.reset();
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl From<LocalLimiter> for RateLimiter {
    fn from(local: LocalLimiter) -> Self {
        Self::with_backend(Arc::new(local))
    }
}
