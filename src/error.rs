use thiserror::Error;

/// Errors surfaced by the limiter.
///
/// Being rate limited is not an error; it is a [`crate::RateLimitDecision`]
/// with `success == false`.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("invalid rate limit config: {0}")]
    InvalidConfig(String),

    #[error("rate limiter misconfigured: {0}")]
    Config(String),

    #[error("remote counter store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote counter store returned HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("remote counter store error: {0}")]
    Remote(String),

    #[error("unexpected reply from remote counter store: {0}")]
    Protocol(String),

    #[error("failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, LimiterError>;
