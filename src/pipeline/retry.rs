use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::{Error, Result};

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Bounded retries with exponential backoff for per-element async work.
///
/// Every error is retried until `max_attempts` unless narrowed with
/// [`RetryPolicy::retry_if`].
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Option<Duration>,
    retry_if: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(5),
            jitter: None,
            retry_if: Arc::new(|_| true),
        }
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.jitter = Some(max_jitter);
        self
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, error: &Error) -> bool {
        (self.retry_if)(error)
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let mut delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay = delay.min(self.max_delay);

        if let Some(max_jitter) = self.jitter {
            let jitter = deterministic_jitter(max_jitter, attempt);
            delay = delay.saturating_add(jitter).min(self.max_delay);
        }

        delay
    }

    /// Call `f(item)` until it succeeds, the error is not retryable, or the
    /// attempts run out.
    ///
    /// A non-retryable error is returned as is; running out of attempts
    /// yields [`Error::RetryExhausted`] wrapping the last error.
    pub async fn run<I, O, F, Fut>(&self, stage: &'static str, item: I, f: F) -> Result<O>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O>>,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 1u32;

        loop {
            let error = match f(item.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let retryable = self.is_retryable(&error);

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "backflow.retry.attempt_failed",
                stage = stage,
                attempt = attempt,
                max_attempts = max_attempts,
                retryable = retryable,
                error = %error,
                "backflow.retry.attempt_failed"
            );

            if !retryable {
                return Err(error);
            }
            if attempt >= max_attempts {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::ERROR,
                    event = "backflow.retry.exhausted",
                    stage = stage,
                    attempts = max_attempts,
                    error = %error,
                    "backflow.retry.exhausted"
                );
                return Err(Error::retry_exhausted(stage, max_attempts, error));
            }

            let delay = self.backoff_delay(attempt);
            if !delay.is_zero() {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "backflow.retry.sleep",
                    stage = stage,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backflow.retry.sleep"
                );
                tokio::time::sleep(delay).await;
            }

            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

fn deterministic_jitter(max_jitter: Duration, attempt: u32) -> Duration {
    let nanos = max_jitter.as_nanos().min(u128::from(u64::MAX)) as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }

    let seed = (attempt as u64)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    Duration::from_nanos(seed % nanos.saturating_add(1))
}

/// Wrap an async function so each call goes through `policy`.
///
/// The result plugs straight into `map_async_unordered`:
///
/// ```no_run
/// use backflow::prelude::*;
///
/// let fetch = retrying("fetch", RetryPolicy::new(3), |id: u32| async move {
///     Ok::<_, backflow::error::Error>(id * 2)
/// });
/// let doubled = Source::from_iter(0..10u32).map_async_unordered(4, fetch);
/// # let _ = doubled;
/// ```
pub fn retrying<I, O, F, Fut>(
    stage: &'static str,
    policy: RetryPolicy,
    f: F,
) -> impl Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static
where
    I: Clone + Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    let f = Arc::new(f);
    move |item: I| -> BoxFuture<'static, Result<O>> {
        let policy = policy.clone();
        let f = f.clone();
        Box::pin(async move { policy.run(stage, item, |i| (*f)(i)).await })
    }
}
