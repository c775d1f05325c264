//! Retries with exponential backoff
//!
//! Only errors whose class is retryable are retried. Each attempt holds a
//! permit of the collaborator's gate while it runs, so backoff waits do not
//! count against the collaborator's concurrency cap. Waiting between
//! attempts stops early when the run is cancelled.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use radar_core::PipelineError;

/// Attempt budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `failed + 1`: base * 2^(failed-1), capped,
    /// plus up to 25% jitter
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let jitter_ms = (delay.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Final error, after `attempts` tries
    Exhausted { error: E, attempts: u32 },
    /// Cancelled while waiting for the next attempt
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Returns the value and the attempts used.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    gate: Option<&Semaphore>,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    E: PipelineError + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let permit = match gate {
            // gates are never closed
            Some(gate) => gate.acquire().await.ok(),
            None => None,
        };
        let result = op().await;
        drop(permit);

        match result {
            Ok(value) => return Ok((value, attempts)),
            Err(error) if error.is_retryable() && attempts < policy.max_attempts => {
                let delay = policy.delay_after(attempts);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempts, policy.max_attempts, error, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(error) => return Err(RetryError::Exhausted { error, attempts }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::SourceError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        let first = policy.delay_after(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.delay_after(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let capped = policy.delay_after(9);
        assert!(capped <= Duration::from_millis(1250));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = &AtomicU32::new(0);
        let result = retry(&fast(), &CancellationToken::new(), "fetch", None, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SourceError::RateLimited("x".into()))
            } else {
                Ok("page")
            }
        })
        .await
        .unwrap();
        assert_eq!(result, ("page", 3));
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let err = retry(&fast(), &CancellationToken::new(), "fetch", None, || async {
            Err::<(), _>(SourceError::Timeout("x".into()))
        })
        .await
        .unwrap_err();
        match err {
            RetryError::Exhausted { error, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(error, SourceError::Timeout("x".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = retry(&fast(), &CancellationToken::new(), "fetch", None, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(SourceError::NotFound("x".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..fast()
        };
        let err = retry(&policy, &cancel, "fetch", None, || async {
            Err::<(), _>(SourceError::RateLimited("x".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 1 }));
    }
}
