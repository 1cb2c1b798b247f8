use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder, register_histogram,
    register_int_counter, register_int_counter_vec, register_int_gauge,
};

use crate::error::{LimiterError, Result};

lazy_static! {
    pub static ref DECISIONS: IntCounterVec = register_int_counter_vec!(
        "ratelimit_decisions_total",
        "Rate limit decisions by backend and outcome",
        &["backend", "outcome"]
    )
    .unwrap();
    pub static ref BACKEND_ERRORS: IntCounter = register_int_counter!(
        "ratelimit_backend_errors_total",
        "Failed calls to the remote counter store"
    )
    .unwrap();
    pub static ref FALLBACKS: IntCounter = register_int_counter!(
        "ratelimit_fallbacks_total",
        "Decisions answered locally because the remote store failed"
    )
    .unwrap();
    pub static ref WINDOWS_REAPED: IntCounter = register_int_counter!(
        "ratelimit_windows_reaped_total",
        "Expired windows removed by the lazy reaper"
    )
    .unwrap();
    pub static ref WINDOWS_TRACKED: IntGauge = register_int_gauge!(
        "ratelimit_windows_tracked",
        "Identities currently held in the local window store"
    )
    .unwrap();
    pub static ref DECISION_LATENCY: Histogram = register_histogram!(
        "ratelimit_decision_latency_seconds",
        "Time to reach an admission decision in seconds"
    )
    .unwrap();
}

// Encode everything in the default registry for a /metrics endpoint
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| LimiterError::Metrics(prometheus::Error::Msg(e.to_string())))
}
