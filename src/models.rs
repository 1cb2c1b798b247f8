use serde::{Deserialize, Serialize};

// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub success: bool,   // admitted?
    pub limit: u32,      // max requests for this window
    pub remaining: u32,  // quota left after this call
    pub reset: i64,      // epoch millis when the window ends
}

impl RateLimitDecision {
    pub fn admitted(limit: u32, remaining: u32, reset: i64) -> Self {
        Self {
            success: true,
            limit,
            remaining,
            reset,
        }
    }

    // Rejected calls report the window's existing reset so retry-after stays stable
    pub fn rejected(limit: u32, reset: i64) -> Self {
        Self {
            success: false,
            limit,
            remaining: 0,
            reset,
        }
    }

    /// Whole seconds until the window resets, rounded up. Zero once it has passed.
    pub fn retry_after_secs(&self, now_millis: i64) -> u64 {
        let wait = self.reset.saturating_sub(now_millis);
        if wait <= 0 {
            0
        } else {
            (wait as u64).div_ceil(1_000)
        }
    }
}
