use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::EtlError;

/// Run `operation` up to `max_attempts` times with a fixed delay in between.
///
/// Only retryable error kinds are retried; a fatal error returns at once.
/// On success also returns how many attempts it took.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    delay: Duration,
    mut operation: F,
) -> Result<(T, u32), EtlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EtlError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                warn!("⚠️  {} attempt {}/{} failed: {}. Retrying...", label, attempts, max_attempts, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
