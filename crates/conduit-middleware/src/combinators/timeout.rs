//! Deadline combinator.
//!
//! The wrapped unit runs on its own task so that it can keep going after the
//! deadline. It works on a fork of the context; when it calls its
//! continuation, the fork's state travels back to the caller, the real
//! downstream chain runs on the caller's context, and the resulting state
//! travels back to the unit.

use super::metric_names;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareResult, Next};
use conduit_config::TimeoutConfig;
use conduit_core::{context, ConduitError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A unit raced against a deadline.
///
/// Created by [`with_timeout`].
pub struct WithTimeout {
    unit: BoxedMiddleware,
    timeout: Duration,
}

/// Fails with [`ConduitError::Timeout`] if `unit` has not finished within
/// `timeout`.
///
/// The unit is not cancelled: it keeps running in the background, but
/// nothing it does after the deadline reaches the caller. If it calls its
/// continuation after the deadline, that call fails with
/// [`ConduitError::Cancelled`]. The deadline also bounds the downstream
/// chain the unit runs through its continuation.
///
/// # Example
///
/// ```
/// use conduit_middleware::combinators::with_timeout;
/// use conduit_middleware::from_fn;
/// use std::time::Duration;
///
/// let lookup = from_fn("lookup", |ctx, next| next.run(ctx));
/// let unit = with_timeout(lookup, Duration::from_millis(250));
/// ```
pub fn with_timeout<M: Middleware>(unit: M, timeout: Duration) -> WithTimeout {
    WithTimeout {
        unit: Arc::new(unit),
        timeout,
    }
}

impl WithTimeout {
    /// Creates a timeout unit using the configured default deadline.
    pub fn from_config<M: Middleware>(unit: M, config: &TimeoutConfig) -> Self {
        with_timeout(unit, config.duration())
    }

    /// Returns the deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn expired(&self, ctx: &MiddlewareContext) -> ConduitError {
        let unit = self.unit.name();
        tracing::warn!(
            request_id = %ctx.request_id(),
            unit,
            timeout_ms = self.timeout.as_millis() as u64,
            "unit exceeded its deadline"
        );
        metrics::counter!(metric_names::TIMEOUTS, "unit" => unit).increment(1);
        ConduitError::timeout(format!("`{unit}` did not finish in time"), self.timeout)
    }
}

impl Middleware for WithTimeout {
    fn name(&self) -> &'static str {
        "with-timeout"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + self.timeout;
            let (calls_tx, mut calls_rx) = mpsc::unbounded_channel();

            let unit = Arc::clone(&self.unit);
            let mut fork = ctx.fork();
            let scope = Arc::clone(ctx.scope());
            let mut task = tokio::spawn(context::enter(scope, async move {
                let result = unit.invoke(&mut fork, Next::remote(calls_tx)).await;
                (fork.take_state(), result)
            }));

            let expiry = tokio::time::sleep_until(deadline);
            tokio::pin!(expiry);

            loop {
                tokio::select! {
                    biased;

                    joined = &mut task => {
                        return match joined {
                            Ok((state, result)) => {
                                ctx.restore(state);
                                result
                            }
                            Err(join_error) => Err(ConduitError::internal_with_source(
                                format!("`{}` did not complete", self.unit.name()),
                                join_error,
                            )),
                        };
                    }

                    Some(call) = calls_rx.recv() => {
                        ctx.restore(call.state);
                        match tokio::time::timeout_at(deadline, next.clone().run(ctx)).await {
                            Ok(result) => {
                                // A closed reply means the unit stopped waiting; nothing to do.
                                let _ = call.reply.send((ctx.snapshot(), result));
                            }
                            Err(_) => return Err(self.expired(ctx)),
                        }
                    }

                    () = &mut expiry => return Err(self.expired(ctx)),
                }
            }
        })
    }
}
