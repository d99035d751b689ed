//! Rate-limit envelope: bounded exponential backoff around upstream calls.
//!
//! Retries only on throttle signals (HTTP 429 or an error that reads like a
//! rate limit). Sleeps are sliced so a cancel request interrupts the wait
//! within ~250 ms instead of blocking for a whole backoff step.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{CancelProbe, SiteError};

/// Backoff policy for upstream throttle responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Total wall-clock budget for retrying one call.
    pub retry_window: Duration,
    /// First backoff step; doubles on each retry.
    pub initial_backoff: Duration,
    /// Upper bound on a single backoff step.
    pub max_backoff: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            retry_window: Duration::from_secs(180),
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Does this error text look like an upstream throttle?
pub fn is_rate_limit_error_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
}

/// Sleep for `duration`, checking the cancel probe every slice. Returns
/// `false` if a cancel was observed before the sleep finished.
pub async fn sleep_with_cancel(duration: Duration, probe: &CancelProbe) -> bool {
    if duration.is_zero() {
        return true;
    }
    let deadline = Instant::now() + duration;
    loop {
        if probe() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let step = (deadline - now).min(SLEEP_SLICE);
        tokio::time::sleep(step).await;
    }
}

/// Run `op` with rate-limit-aware retrying.
///
/// `is_throttled` classifies a successful response as a throttle signal
/// (HTTP 429 for the live adapter). Any non-throttled response is returned
/// as-is; non-throttle errors surface immediately. Throttles retry with
/// exponential backoff until the retry window closes, then fail with the
/// user-facing "retry later" error.
pub async fn request_with_backoff<T, E, F, Fut>(
    mut op: F,
    is_throttled: impl Fn(&T) -> bool,
    probe: &CancelProbe,
    config: &RateLimitConfig,
) -> Result<T, SiteError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let window = config.retry_window.as_secs_f64();
    let max_backoff = config.max_backoff.as_secs_f64();
    let mut backoff = config.initial_backoff.as_secs_f64();
    let mut elapsed = 0.0_f64;
    let mut retries = 0u32;

    loop {
        if probe() {
            return Err(SiteError::Cancelled);
        }
        match op().await {
            Ok(response) if !is_throttled(&response) => return Ok(response),
            Ok(_) => {} // throttled response; fall through to backoff
            Err(err) => {
                if !is_rate_limit_error_text(&err.to_string()) {
                    return Err(SiteError::Http(err.to_string()));
                }
            }
        }

        if elapsed >= window {
            return Err(SiteError::RetryBudgetExhausted);
        }
        let mut sleep_for = backoff.min(max_backoff);
        let remaining = window - elapsed;
        if sleep_for > remaining {
            sleep_for = remaining;
        }
        if sleep_for <= 0.0 {
            return Err(SiteError::RetryBudgetExhausted);
        }
        retries += 1;
        debug!(retries, sleep_seconds = sleep_for, "upstream throttled, backing off");
        if !sleep_with_cancel(Duration::from_secs_f64(sleep_for), probe).await {
            return Err(SiteError::Cancelled);
        }
        elapsed += sleep_for;
        backoff *= 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::site::never_cancelled;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            retry_window: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        }
    }

    #[test]
    fn test_rate_limit_error_text() {
        assert!(is_rate_limit_error_text("HTTP 429 returned"));
        assert!(is_rate_limit_error_text("Rate Limit exceeded"));
        assert!(is_rate_limit_error_text("too many requests, slow down"));
        assert!(!is_rate_limit_error_text("connection refused"));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let probe = never_cancelled();
        let result = request_with_backoff(
            move || {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u16, std::io::Error>(if n < 2 { 429 } else { 200 })
                }
            },
            |status| *status == 429,
            &probe,
            &fast_config(),
        )
        .await;
        assert_eq!(result.unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_message() {
        let probe = never_cancelled();
        let result = request_with_backoff(
            || async { Ok::<u16, std::io::Error>(429) },
            |status| *status == 429,
            &probe,
            &fast_config(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, SiteError::RetryBudgetExhausted));
        let text = err.to_string();
        assert!(text.contains("retry"), "message should ask to retry: {text}");
        assert!(text.contains("3 minutes"), "message should mention window: {text}");
    }

    #[tokio::test]
    async fn test_non_throttle_error_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let probe = never_cancelled();
        let result = request_with_backoff(
            move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u16, _>(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ))
                }
            },
            |status| *status == 429,
            &probe,
            &fast_config(),
        )
        .await;
        assert!(matches!(result.unwrap_err(), SiteError::Http(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let probe: CancelProbe = Arc::new(move || flag.load(Ordering::SeqCst));
        let config = RateLimitConfig {
            retry_window: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30),
        };

        let started = std::time::Instant::now();
        let op_cancelled = cancelled.clone();
        let result = request_with_backoff(
            move || {
                // Flip the cancel bit on the first throttle so the backoff
                // sleep is interrupted rather than served.
                let cancelled = op_cancelled.clone();
                async move {
                    cancelled.store(true, Ordering::SeqCst);
                    Ok::<u16, std::io::Error>(429)
                }
            },
            |status| *status == 429,
            &probe,
            &config,
        )
        .await;
        assert!(matches!(result.unwrap_err(), SiteError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_with_cancel_completes_when_not_cancelled() {
        let probe = never_cancelled();
        assert!(sleep_with_cancel(Duration::from_millis(20), &probe).await);
    }
}
