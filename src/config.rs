use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::error::{LimiterError, Result};

pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";
pub const DEFAULT_REST_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SWEEP_SECS: u64 = 300;
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

// Which counter store backs the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    #[default]
    Local,
    #[value(alias = "redis")]
    Remote,
}

// Decides what happens when the remote store is down:
// production fails closed, development falls back to local counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

// Limiter settings. Every flag can also come from the environment so the
// embedding binary can `#[command(flatten)]` this into its own CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "request-limiter")]
#[command(about = "Per-identity fixed window request limiter")]
pub struct LimiterArgs {
    // Counter store: local memory or the remote REST store
    #[arg(long = "rate-limit-backend", env = "RATE_LIMIT_BACKEND", value_enum, default_value_t = BackendKind::Local)]
    pub backend: BackendKind,

    #[arg(long = "app-env", env = "APP_ENV", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    // Remote store endpoint, e.g. "https://eu1-xxx.upstash.io"
    #[arg(long = "rate-limit-rest-url", env = "RATE_LIMIT_REST_URL")]
    pub rest_url: Option<String>,

    #[arg(long = "rate-limit-rest-token", env = "RATE_LIMIT_REST_TOKEN", hide_env_values = true)]
    pub rest_token: Option<String>,

    // Namespace for keys written to the remote store
    #[arg(long = "rate-limit-key-prefix", env = "RATE_LIMIT_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    #[arg(long = "rate-limit-rest-timeout-ms", env = "RATE_LIMIT_REST_TIMEOUT_MS", default_value_t = DEFAULT_REST_TIMEOUT_MS)]
    pub rest_timeout_ms: u64,

    // Minimum gap between two sweeps of expired windows
    #[arg(long = "rate-limit-sweep-secs", env = "RATE_LIMIT_SWEEP_SECS", default_value_t = DEFAULT_SWEEP_SECS)]
    pub sweep_secs: u64,

    // Hard cap on tracked identities
    #[arg(long = "rate-limit-max-entries", env = "RATE_LIMIT_MAX_ENTRIES", default_value_t = DEFAULT_MAX_ENTRIES)]
    pub max_entries: usize,
}

impl LimiterArgs {
    pub fn rest_timeout(&self) -> Duration {
        Duration::from_millis(self.rest_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }
}

impl Default for LimiterArgs {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            environment: Environment::Development,
            rest_url: None,
            rest_token: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            rest_timeout_ms: DEFAULT_REST_TIMEOUT_MS,
            sweep_secs: DEFAULT_SWEEP_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Quota for one call site: at most `max_requests` per `window_ms`.
///
/// Supplied on every call rather than held globally, so different routes can
/// use different limits. Two call sites sharing identity keys also share
/// their accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(LimiterError::InvalidConfig(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 || window_ms > i64::MAX as u64 {
            return Err(LimiterError::InvalidConfig(format!(
                "window_ms must be in 1..={}, got {}",
                i64::MAX,
                window_ms
            )));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    pub fn per_window(max_requests: u32, window: Duration) -> Result<Self> {
        Self::new(max_requests, window.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
