use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter, exposed as a free helper rather than a
/// centralized retry budget (SPEC_FULL.md §5: "retry budget not
/// centralized — only a `retry::with_backoff` helper exposed"). Phase
/// executors that call flaky remote endpoints call this directly; the Brain
/// itself never retries a whole phase.
pub async fn with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(_) => {
                let exp = base_delay * 2u32.pow(attempt - 1);
                let jitter_ms = rand::thread_rng().gen_range(0..=50);
                tokio::time::sleep(exp + Duration::from_millis(jitter_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(5, Duration::from_millis(1), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err("not yet")
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(3, Duration::from_millis(1), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("always fails")
        })
        .await;
        assert_eq!(result, Err("always fails"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
