//! Backoff for rate-limit rejections. Nothing else is retried: a write that
//! failed in transit may already have been applied remotely.

use std::time::Duration;

use rand::Rng;

pub(crate) const QUERY_LIMIT_EXCEEDED: &str = "QUERY_LIMIT_EXCEEDED";

/// Returns `true` when the remote refused the call because of request velocity.
pub(crate) fn is_rate_limited(status: u16, code: &str) -> bool {
    status == 429 || code.eq_ignore_ascii_case(QUERY_LIMIT_EXCEEDED)
}

/// Exponential backoff from `base`, doubled each attempt, with +/-25% jitter.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = base_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    let delay_ms = (base_ms as i64 + jitter).max(1) as u64;
    Duration::from_millis(delay_ms)
}
