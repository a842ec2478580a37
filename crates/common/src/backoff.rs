//! Exponential backoff with optional jitter.
//!
//! Used by the connection supervisor for reconnects and by the webhook
//! dispatcher between delivery attempts.

use std::time::Duration;

use rand::Rng;

/// `min(max, base * 2^attempt)`. Attempt 0 yields `base`.
#[must_use]
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    base.saturating_mul(factor).min(max)
}

/// [`backoff_delay`] plus up to 25% random jitter, still capped at `max`.
#[must_use]
pub fn backoff_delay_jittered(base: Duration, max: Duration, attempt: u32) -> Duration {
    let delay = backoff_delay(base, max, attempt);
    let jitter_ms = (delay.as_millis() as u64) / 4;
    if jitter_ms == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=jitter_ms);
    (delay + Duration::from_millis(extra)).min(max)
}
