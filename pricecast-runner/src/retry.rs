//! Bounded retry for price store reads.

use std::time::Duration;

use tracing::warn;

use crate::store::StoreError;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating instead of overflowing.
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Run `op`, retrying up to `retries` more times while it fails with a
/// transient error. Retry `n` waits [`backoff`]`(base_delay, n)`.
/// Permanent errors return immediately.
pub fn read_with_retry<T, F>(retries: u32, base_delay: Duration, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            std::thread::sleep(backoff(base_delay, attempt));
        }
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(attempt, retries, error = %e, "transient read failure, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
