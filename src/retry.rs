//! Bounded retry with a fixed delay.
//!
//! Every call into the search engine goes through [`RetryPolicy::execute`].
//! Failures there are expected to be transient infrastructure hiccups, so the
//! delay between attempts is constant rather than exponential.
//!
//! # Example
//!
//! ```
//! use compliance_cache::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.max_attempts, 3);
//! assert_eq!(policy.delay, Duration::from_secs(5));
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default number of attempts, the first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between two attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Marker returned (converted into the caller's error type) when the
/// cancel signal fires between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancelled")
    }
}

/// Request-scoped cancellation, shared by clones.
///
/// Once cancelled it stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        CancelSignal {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `cancel` has been called on this signal or a clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // the sender lives as long as `self`, so this only returns on cancel
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry configuration, injected once and shared by every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        RetryPolicy::new(1, Duration::ZERO)
    }

    /// Build from `SEARCH_RETRY_MAX_ATTEMPTS` and `SEARCH_RETRY_DELAY_MS`,
    /// falling back to the defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let max_attempts = std::env::var("SEARCH_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let delay = std::env::var("SEARCH_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DELAY);

        RetryPolicy::new(max_attempts, delay)
    }

    /// Run `op` under this policy. See [`execute_with_retry`].
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        cancel: &CancelSignal,
        op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + From<Cancelled>,
    {
        execute_with_retry(operation_name, self.max_attempts, self.delay, cancel, op).await
    }

    /// Like [`execute`](Self::execute), but an error for which `retryable`
    /// is false is returned at once.
    pub async fn execute_if<F, Fut, T, E, R>(
        &self,
        operation_name: &str,
        cancel: &CancelSignal,
        retryable: R,
        op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + From<Cancelled>,
        R: Fn(&E) -> bool,
    {
        execute_with_retry_if(
            operation_name,
            self.max_attempts,
            self.delay,
            cancel,
            retryable,
            op,
        )
        .await
    }
}

/// Invoke `op` up to `max_attempts` times, sleeping `delay` between attempts.
///
/// Returns the first success. When every attempt fails, the error of the
/// *last* attempt is returned as-is. The signal is checked before each attempt
/// and raced against the sleep; once cancelled no further attempt is made and
/// `E::from(Cancelled)` is returned. An attempt that is already running is
/// left to its own cancellation handling.
pub async fn execute_with_retry<F, Fut, T, E>(
    operation_name: &str,
    max_attempts: u32,
    delay: Duration,
    cancel: &CancelSignal,
    op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + From<Cancelled>,
{
    execute_with_retry_if(operation_name, max_attempts, delay, cancel, |_: &E| true, op).await
}

/// [`execute_with_retry`] that only retries errors accepted by `retryable`.
pub async fn execute_with_retry_if<F, Fut, T, E, R>(
    operation_name: &str,
    max_attempts: u32,
    delay: Duration,
    cancel: &CancelSignal,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + From<Cancelled>,
    R: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            debug!("'{}' cancelled before attempt {}", operation_name, attempt + 1);
            return Err(E::from(Cancelled));
        }

        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        "'{}' succeeded on attempt {}/{}",
                        operation_name, attempt, max_attempts
                    );
                }
                return Ok(value);
            }
            Err(err) if !retryable(&err) => {
                warn!(
                    "'{}' failed on attempt {}/{} (not retryable): {}",
                    operation_name, attempt, max_attempts, err
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    "'{}' failed on final attempt {}/{}: {}",
                    operation_name, attempt, max_attempts, err
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    "'{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    operation_name, attempt, max_attempts, err, delay
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("'{}' cancelled while waiting to retry", operation_name);
                        return Err(E::from(Cancelled));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Attempt(u32),
        Cancelled,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    fn failing_until(
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, TestError>> + Send>>
    {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(TestError::Attempt(n))
                }
            })
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try_without_waiting() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .execute("op", &CancelSignal::new(), failing_until(calls.clone(), 1))
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invokes_exactly_n_times_before_success() {
        for n in 1..=3 {
            let calls = Arc::new(AtomicU32::new(0));
            let result = RetryPolicy::default()
                .execute("op", &CancelSignal::new(), failing_until(calls.clone(), n))
                .await;

            assert_eq!(result, Ok(n));
            assert_eq!(calls.load(Ordering::SeqCst), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let _ = RetryPolicy::new(3, Duration::from_secs(5))
            .execute("op", &CancelSignal::new(), failing_until(calls, 3))
            .await;

        // two waits, no backoff growth
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = RetryPolicy::new(3, Duration::from_millis(10))
            .execute("op", &CancelSignal::new(), failing_until(calls.clone(), 99))
            .await;

        assert_eq!(result, Err(TestError::Attempt(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_behaves_like_one() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = execute_with_retry(
            "op",
            0,
            Duration::ZERO,
            &CancelSignal::new(),
            failing_until(calls.clone(), 99),
        )
        .await;

        assert_eq!(result, Err(TestError::Attempt(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_signal_prevents_any_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = RetryPolicy::default()
            .execute("op", &cancel, failing_until(calls.clone(), 1))
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_aborts_further_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancelSignal::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = RetryPolicy::new(3, Duration::from_secs(5))
            .execute("op", &cancel, failing_until(calls.clone(), 99))
            .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_at_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .execute_if(
                "op",
                &CancelSignal::new(),
                |e: &TestError| !matches!(e, TestError::Attempt(1)),
                failing_until(calls.clone(), 99),
            )
            .await;

        assert_eq!(result, Err(TestError::Attempt(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancel_signal_shared_by_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());

        signal.cancel();
        assert!(clone.is_cancelled());
        // resolves immediately once cancelled
        clone.cancelled().await;
    }
}
