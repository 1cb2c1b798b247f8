//! Per-identity fixed window request limiter.
//!
//! One [`RateLimiter`] is built when the application is composed and shared by
//! every request handler. Each call counts against the caller's identity
//! (usually its IP, see [`identity::client_ip`]) under a per-call
//! [`RateLimitConfig`]. Same-identity decisions are serialized; different
//! identities never contend.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod reaper;
pub mod serializer;

pub use backend::{FallbackBackend, LocalLimiter, RateLimitBackend, RestCounterBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, Environment, LimiterArgs, RateLimitConfig};
pub use error::{LimiterError, Result};
pub use identity::client_ip;
pub use limiter::RateLimiter;
pub use models::RateLimitDecision;
