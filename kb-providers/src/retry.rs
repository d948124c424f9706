use std::time::Duration;

use rand::Rng;

/// Shared by both provider error enums so [`with_backoff`] can drive either.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

/// Bounded exponential backoff with jitter, applied uniformly to embedding
/// and chat provider calls. §4.2/§7: 429 and 5xx are retryable, 4xx
/// authentication/malformed-request errors and dimension mismatches are
/// fatal and must not be retried.
pub async fn with_backoff<T, E, F, Fut>(max_attempts: u32, base: Duration, mut call: F) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                let exp = base * 2u32.pow(attempt);
                let jitter_ms = rand::thread_rng().gen_range(0..50);
                let delay = exp + Duration::from_millis(jitter_ms);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after a retryable provider error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
