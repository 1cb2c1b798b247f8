use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::RateLimitBackend;
use crate::config::{LimiterArgs, RateLimitConfig};
use crate::error::{LimiterError, Result};
use crate::metrics::BACKEND_ERRORS;
use crate::models::RateLimitDecision;

// Same fixed window as the local store, evaluated atomically by the remote
// store on its own clock. The window lives in a hash {count, reset}; `reset`
// is absolute epoch millis, so every reply within a window carries the same
// value. A window with a stale or missing reset is renewed and its expiry
// re-armed. A full window answers without HINCRBY, so rejections cost no
// quota. Returns {admitted, count, reset}.
const FIXED_WINDOW_SCRIPT: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local state = redis.call('HMGET', KEYS[1], 'count', 'reset')
local count = tonumber(state[1]) or 0
local reset = tonumber(state[2])
if reset == nil or reset <= now then
  reset = now + tonumber(ARGV[2])
  redis.call('HSET', KEYS[1], 'count', 1, 'reset', reset)
  redis.call('PEXPIREAT', KEYS[1], reset)
  return {1, 1, reset}
end
if count >= tonumber(ARGV[1]) then
  return {0, count, reset}
end
count = redis.call('HINCRBY', KEYS[1], 'count', 1)
return {1, count, reset}
"#;

// Reply body of the REST endpoint: either `result` or `error`
#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Shared counter store reached over HTTPS (Redis REST protocol: a JSON
/// command array POSTed with a bearer token).
///
/// Identities are hashed before leaving the process.
pub struct RestCounterBackend {
    client: reqwest::Client,
    url: String,
    token: String,
    key_prefix: String,
    healthy: AtomicBool, // did the last call succeed?
}

impl RestCounterBackend {
    pub fn new(url: &str, token: &str, key_prefix: &str, timeout: Duration) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(LimiterError::Config("remote store url is empty".to_string()));
        }
        // add https:// if not present
        let url = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(client_build_error)?;

        Ok(Self {
            client,
            url,
            token: token.to_string(),
            key_prefix: key_prefix.to_string(),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn from_args(args: &LimiterArgs) -> Result<Self> {
        let (Some(url), Some(token)) = (args.rest_url.as_deref(), args.rest_token.as_deref()) else {
            return Err(LimiterError::Config(
                "remote backend needs RATE_LIMIT_REST_URL and RATE_LIMIT_REST_TOKEN".to_string(),
            ));
        };
        Self::new(url, token, &args.key_prefix, args.rest_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn storage_key(&self, identity: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        format!("{}:{:x}", self.key_prefix, hasher.finalize())
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    // Log status changes only
    fn set_healthy(&self, healthy: bool) {
        let was_healthy = self.healthy.swap(healthy, Ordering::Relaxed);
        if was_healthy != healthy {
            if healthy {
                info!(url = %self.url, "remote counter store is healthy again");
            } else {
                warn!(url = %self.url, "remote counter store is unhealthy");
            }
        }
    }

    async fn eval(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision> {
        let command = json!([
            "EVAL",
            FIXED_WINDOW_SCRIPT,
            "1",
            self.storage_key(key),
            config.max_requests.to_string(),
            config.window_ms.to_string(),
        ]);

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        let reply = match serde_json::from_str::<RestReply>(&body) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(LimiterError::RemoteStatus {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => return Err(LimiterError::Protocol(format!("invalid reply body: {}", e))),
        };

        if let Some(error) = reply.error {
            return Err(LimiterError::Remote(error));
        }
        if !status.is_success() {
            return Err(LimiterError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let triple = reply
            .result
            .and_then(|value| serde_json::from_value::<[i64; 3]>(value).ok())
            .ok_or_else(|| LimiterError::Protocol(format!("expected [admitted, count, reset], got {}", body)))?;

        Ok(decision_from_reply(triple, config))
    }
}

// A client that cannot be built is a setup problem, not an outage
fn client_build_error(e: reqwest::Error) -> LimiterError {
    LimiterError::Config(format!("failed to build HTTP client: {}", e))
}

fn decision_from_reply([admitted, count, reset]: [i64; 3], config: &RateLimitConfig) -> RateLimitDecision {
    let limit = config.max_requests;

    if admitted == 1 {
        let count = count.clamp(0, i64::from(limit)) as u32;
        RateLimitDecision::admitted(limit, limit - count, reset)
    } else {
        RateLimitDecision::rejected(limit, reset)
    }
}

#[async_trait]
impl RateLimitBackend for RestCounterBackend {
    async fn admit(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision> {
        match self.eval(key, config).await {
            Ok(decision) => {
                self.set_healthy(true);
                debug!(remaining = decision.remaining, success = decision.success, "remote decision");
                Ok(decision)
            }
            Err(e) => {
                self.set_healthy(false);
                BACKEND_ERRORS.inc();
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> RestCounterBackend {
        RestCounterBackend::new(url, "token", "ratelimit", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(backend("counter.example/").url(), "https://counter.example");
        assert_eq!(backend("http://127.0.0.1:9000").url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn storage_key_hides_identity() {
        let key = backend("counter.example").storage_key("10.0.0.1");
        assert!(key.starts_with("ratelimit:"));
        assert!(!key.contains("10.0.0.1"));
        assert_eq!(key.len(), "ratelimit:".len() + 64);
    }

    #[test]
    fn reply_maps_to_decision() {
        let cfg = RateLimitConfig::new(3, 60_000).unwrap();

        let admitted = decision_from_reply([1, 2, 1_700_000_060_000], &cfg);
        assert!(admitted.success);
        assert_eq!(admitted.remaining, 1);
        assert_eq!(admitted.reset, 1_700_000_060_000);

        let rejected = decision_from_reply([0, 3, 1_700_000_060_000], &cfg);
        assert!(!rejected.success);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset, admitted.reset);
    }

    #[test]
    fn script_renews_stale_windows_and_rearms_expiry() {
        assert!(FIXED_WINDOW_SCRIPT.contains("reset == nil or reset <= now"));
        assert!(FIXED_WINDOW_SCRIPT.contains("PEXPIREAT"));
        assert!(!FIXED_WINDOW_SCRIPT.contains("PTTL"));
    }

    #[test]
    fn client_build_failure_is_a_config_error() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(matches!(client_build_error(err), LimiterError::Config(msg) if msg.starts_with("failed to build HTTP client")));
    }

    #[test]
    fn from_args_requires_url_and_token() {
        let args = LimiterArgs {
            rest_url: Some("https://counter.example".to_string()),
            ..LimiterArgs::default()
        };
        let result = RestCounterBackend::from_args(&args);
        assert!(matches!(result, Err(LimiterError::Config(_))));
    }
}
