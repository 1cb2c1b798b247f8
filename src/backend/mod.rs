//! Counter store backends.
//!
//! Every backend answers the same question (admit this identity under this
//! quota?) with the same fixed window semantics:
//! - [`LocalLimiter`]: in-process windows, per-key serialized
//! - [`RestCounterBackend`]: a shared remote store reached over HTTPS
//! - [`FallbackBackend`]: remote first, local when the remote store fails

mod fallback;
mod local;
mod remote;

pub use fallback::FallbackBackend;
pub use local::LocalLimiter;
pub use remote::RestCounterBackend;

use async_trait::async_trait;

use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::models::RateLimitDecision;

#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one call for `key` and decide whether it is admitted.
    async fn admit(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision>;

    /// Short label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Drop all process-local state. Remote state is not owned by the process
    /// and is left alone.
    fn reset(&self) {}
}
