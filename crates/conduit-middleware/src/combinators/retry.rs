//! Retry combinator.

use super::metric_names;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareResult, Next};
use conduit_config::RetryConfig;
use conduit_core::ConduitError;
use std::sync::Arc;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// When and how often [`with_retry`] re-runs a unit.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
    should_retry: Arc<dyn Fn(&ConduitError) -> bool + Send + Sync>,
}

impl RetryPolicy {
    /// Creates the default policy: 3 retries, 1 s apart, retrying every error.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            should_retry: Arc::new(|_: &ConduitError| true),
        }
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets which errors are worth retrying.
    #[must_use]
    pub fn should_retry<F>(mut self, should_retry: F) -> Self
    where
        F: Fn(&ConduitError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(should_retry);
        self
    }

    /// Retries only transient and timeout errors.
    #[must_use]
    pub fn transient_only(self) -> Self {
        self.should_retry(ConduitError::is_transient)
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new()
            .max_retries(config.max_retries)
            .retry_delay(config.retry_delay())
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// A unit re-run on failure.
///
/// Created by [`with_retry`].
pub struct WithRetry {
    unit: BoxedMiddleware,
    policy: RetryPolicy,
}

/// Re-runs `unit` from scratch while it fails with a retryable error.
///
/// Each attempt gets a fresh clone of the continuation, so a unit that calls
/// it re-runs the downstream chain too. Both the unit and everything
/// downstream must tolerate repeated execution. When attempts run out, the
/// last error is returned.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::{with_retry, RetryPolicy};
/// use conduit_middleware::from_fn;
/// use std::time::Duration;
///
/// let fetch = from_fn("fetch-profile", |ctx, next| next.run(ctx));
/// let unit = with_retry(
///     fetch,
///     RetryPolicy::new()
///         .max_retries(2)
///         .retry_delay(Duration::from_millis(50))
///         .transient_only(),
/// );
/// ```
pub fn with_retry<M: Middleware>(unit: M, policy: RetryPolicy) -> WithRetry {
    WithRetry {
        unit: Arc::new(unit),
        policy,
    }
}

impl Middleware for WithRetry {
    fn name(&self) -> &'static str {
        "with-retry"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let unit = self.unit.name();
            let mut retries = 0;
            loop {
                let error = match self.unit.invoke(ctx, next.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(error) => error,
                };

                if retries >= self.policy.max_retries || !(self.policy.should_retry)(&error) {
                    if retries > 0 {
                        tracing::warn!(
                            request_id = %ctx.request_id(),
                            unit,
                            attempts = retries + 1,
                            error = %error,
                            "giving up after retries"
                        );
                    }
                    return Err(error);
                }

                retries += 1;
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    unit,
                    attempt = retries + 1,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = self.policy.retry_delay.as_millis() as u64,
                    error = %error,
                    "retrying unit"
                );
                metrics::counter!(metric_names::RETRY_ATTEMPTS, "unit" => unit).increment(1);

                if !self.policy.retry_delay.is_zero() {
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        })
    }
}
