//! Bounded retry with jittered backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Runs `op` up to `attempts` times, sleeping `base * attempt` plus up to
/// `base` of jitter between tries.
///
/// Errors for which `retryable` returns false are returned at once; otherwise
/// the last error is returned when every attempt fails.
pub async fn with_jitter<T, E, F, Fut, R>(
    attempts: u32,
    base: Duration,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts || !retryable(&e) => return Err(e),
            Err(e) => {
                let delay = backoff(base, attempt);
                tracing::warn!(attempt, error = %e, ?delay, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter = if base_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=base_ms)
    };
    Duration::from_millis(base_ms * attempt as u64 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_jitter(3, Duration::ZERO, |_| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_jitter(3, Duration::ZERO, |_| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_jitter(
            3,
            Duration::ZERO,
            |e: &String| e != "rejected",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("rejected".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let base = Duration::from_millis(10);
        let first = backoff(base, 1);
        let third = backoff(base, 3);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(20));
        assert!(third >= Duration::from_millis(30) && third <= Duration::from_millis(40));
    }
}
