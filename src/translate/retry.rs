use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const MAX_ATTEMPTS: usize = 5;
pub(crate) const BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const MAX_DELAY: Duration = Duration::from_secs(60);

/// DeepL signals quota pressure with 429 and 456 ("quota exceeded") is final,
/// so only transient statuses and rate-limit bodies are retried.
pub(crate) fn is_retryable(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if matches!(status.as_u16(), 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn wait_with_backoff(
    service: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = match retry_after {
        Some(requested) if requested > delay => requested,
        _ => delay,
    };
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        service,
        wait.as_secs_f32(),
        attempt,
        MAX_ATTEMPTS
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let doubled = Duration::from_secs(current.as_secs().saturating_mul(2)).max(BASE_DELAY);
    doubled.min(MAX_DELAY)
}
