use crate::error::LaasError;
use backon::{BackoffBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts made before startup gives up on the database.
pub const CONNECT_ATTEMPTS: usize = 5;
pub const CONNECT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Backoff whose n-th delay is `n * base`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBuilder {
    base: Duration,
    max_times: usize,
}

impl LinearBuilder {
    /// `max_times` is the number of retries, i.e. attempts minus one.
    pub fn new(base: Duration, max_times: usize) -> Self {
        Self { base, max_times }
    }
}

impl Default for LinearBuilder {
    fn default() -> Self {
        Self::new(CONNECT_BASE_DELAY, CONNECT_ATTEMPTS - 1)
    }
}

#[derive(Debug)]
pub struct LinearBackoff {
    base: Duration,
    max_times: usize,
    attempt: usize,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_times {
            return None;
        }
        self.attempt += 1;
        Some(self.base * self.attempt as u32)
    }
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            base: self.base,
            max_times: self.max_times,
            attempt: 0,
        }
    }
}

/// Run `open` until it succeeds or the backoff runs dry.
/// Exhaustion is reported as [`LaasError::Connection`] carrying the last failure.
pub async fn connect_with_retry<T, F, Fut>(open: F, policy: LinearBuilder) -> Result<T, LaasError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let attempts = policy.max_times + 1;
    open.retry(policy)
        .notify(|err: &sqlx::Error, dur: Duration| {
            warn!(error = %err, retry_in_ms = dur.as_millis() as u64, "database open failed");
        })
        .await
        .map_err(|source| LaasError::Connection { attempts, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Attempt = std::future::Ready<Result<usize, sqlx::Error>>;

    fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> impl FnMut() -> Attempt {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n <= failures {
                Err(sqlx::Error::PoolTimedOut)
            } else {
                Ok(n)
            })
        }
    }

    #[test]
    fn delays_grow_linearly() {
        let delays: Vec<_> = LinearBuilder::default().build().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_four_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let got = connect_with_retry(flaky(4, calls.clone()), LinearBuilder::default())
            .await
            .expect("fifth attempt should connect");
        assert_eq!(got, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn five_failures_are_fatal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = connect_with_retry(flaky(5, calls.clone()), LinearBuilder::default())
            .await
            .expect_err("budget exhausted");
        assert!(matches!(err, LaasError::Connection { attempts: 5, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
