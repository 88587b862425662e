use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error from the last attempt
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(format!("fail {n}")) } else { Ok(n) }
            },
            3,
            1,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always".to_string())
            },
            2,
            1,
        )
        .await;

        assert_eq!(result, Err("always".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
