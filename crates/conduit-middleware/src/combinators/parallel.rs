//! Concurrent fan-out combinator.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareResult, Next};
use futures_util::future::try_join_all;

/// Runs several units concurrently before continuing.
///
/// Created by [`parallel`].
pub struct Parallel {
    units: Vec<BoxedMiddleware>,
}

/// Runs all `units` concurrently, then the continuation once.
///
/// Each unit gets its own [fork](MiddlewareContext::fork) of the context and
/// a no-op continuation, so siblings never touch the same response. The
/// scope is shared; it is the channel siblings use to publish results.
///
/// If every unit succeeds, the items and response edits (headers, status,
/// body) each sibling made are merged into the context in sibling order, so
/// a later sibling wins a conflict, and the real continuation runs. The first failure is returned
/// as soon as it happens; the remaining siblings are dropped and never
/// resumed, and the continuation does not run.
pub fn parallel<I>(units: I) -> Parallel
where
    I: IntoIterator<Item = BoxedMiddleware>,
{
    Parallel {
        units: units.into_iter().collect(),
    }
}

impl Middleware for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let baseline = ctx.snapshot();
            let mut forks: Vec<MiddlewareContext> = self.units.iter().map(|_| ctx.fork()).collect();

            let siblings = self
                .units
                .iter()
                .zip(forks.iter_mut())
                .map(|(unit, fork)| unit.invoke(fork, Next::noop()));

            if let Err(error) = try_join_all(siblings).await {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    siblings = self.units.len(),
                    error = %error,
                    "parallel sibling failed, abandoning the rest"
                );
                return Err(error);
            }

            for fork in forks {
                ctx.merge_fork(&baseline, fork);
            }
            next.run(ctx).await
        })
    }
}
