//! Pipeline composition.
//!
//! A [`PipelineBuilder`] collects units in order; [`PipelineBuilder::build`]
//! freezes them into a [`Pipeline`], which is itself a [`Middleware`].
//!
//! ## Dispatch
//!
//! Every invocation walks the frozen sequence with its own cursor (the
//! position held by each [`Next`]). When the cursor is past the last unit,
//! the continuation handed to the pipeline runs. Units therefore see:
//!
//! ```text
//! U1 before -> U2 before -> U3 before -> continuation -> U3 after -> U2 after -> U1 after
//! ```
//!
//! A pipeline holds no per-request state, so one instance can serve any
//! number of concurrent requests.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareResult, Next};
use std::sync::Arc;

/// An immutable, composed sequence of units.
///
/// # Example
///
/// ```
/// use conduit_middleware::{from_fn, handler_fn, Pipeline};
/// use conduit_middleware::context::MiddlewareContext;
/// use conduit_core::Request;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder()
///     .use_middleware(from_fn("tag", |ctx, next| {
///         Box::pin(async move {
///             ctx.insert_item("tagged", true);
///             next.run(ctx).await
///         })
///     }))
///     .build();
///
/// let handler = handler_fn("ok", |ctx| {
///     Box::pin(async move {
///         let tagged = ctx.has_item("tagged");
///         ctx.response_mut().set_body(serde_json::json!({ "tagged": tagged }));
///         Ok(())
///     })
/// });
///
/// let mut ctx = MiddlewareContext::detached(Request::default());
/// pipeline.execute(&mut ctx, &handler).await.unwrap();
/// assert_eq!(ctx.response().body["tagged"], true);
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    units: Arc<[BoxedMiddleware]>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs the pipeline with `terminal` as its final continuation.
    pub async fn execute(
        &self,
        ctx: &mut MiddlewareContext,
        terminal: &dyn Middleware,
    ) -> MiddlewareResult {
        self.invoke(ctx, Next::terminal(terminal)).await
    }

    /// Returns the names of all units in order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.units.iter().map(|unit| unit.name()).collect()
    }

    /// Returns the number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the pipeline has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Middleware for Pipeline {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Next::chain(&self.units, next).run(ctx)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("units", &self.unit_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
///
/// Order of registration is order of execution.
#[derive(Clone, Default)]
pub struct PipelineBuilder {
    units: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit.
    pub fn use_middleware<M: Middleware>(self, middleware: M) -> Self {
        self.use_boxed(Arc::new(middleware))
    }

    /// Appends an already boxed unit.
    pub fn use_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.units.push(middleware);
        self
    }

    /// Appends a unit only if `condition` holds.
    ///
    /// The condition is evaluated now, at build time, not per request. Use
    /// [`branch`](crate::combinators::branch) for per-request decisions.
    pub fn use_if<M: Middleware>(self, condition: bool, middleware: M) -> Self {
        if condition {
            self.use_middleware(middleware)
        } else {
            tracing::debug!(unit = middleware.name(), "conditional unit skipped");
            self
        }
    }

    /// Inserts a unit at the front.
    ///
    /// Successive calls place the most recently prepended unit first.
    pub fn prepend<M: Middleware>(mut self, middleware: M) -> Self {
        self.units.insert(0, Arc::new(middleware));
        self
    }

    /// Inserts a batch at the front, keeping the batch's own order.
    pub fn prepend_all<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = BoxedMiddleware>,
    {
        let tail = std::mem::take(&mut self.units);
        self.units.extend(units);
        self.units.extend(tail);
        self
    }

    /// Inserts a unit at `index`.
    ///
    /// An index past the end appends.
    pub fn insert<M: Middleware>(mut self, index: usize, middleware: M) -> Self {
        let len = self.units.len();
        if index > len {
            tracing::debug!(index, len, unit = middleware.name(), "insert index clamped to end");
        }
        self.units.insert(index.min(len), Arc::new(middleware));
        self
    }

    /// Returns an independent copy of this builder.
    ///
    /// Changes to either builder afterwards do not affect the other.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no units are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Removes every registered unit.
    pub fn clear(mut self) -> Self {
        self.units.clear();
        self
    }

    /// Composes the registered units into a pipeline, keeping the builder.
    #[must_use]
    pub fn compose(&self) -> Pipeline {
        Pipeline {
            units: self.units.iter().cloned().collect(),
        }
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        tracing::debug!(units = self.units.len(), "pipeline composed");
        Pipeline {
            units: self.units.into(),
        }
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field(
                "units",
                &self.units.iter().map(|unit| unit.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use conduit_core::{ConduitError, Request};
    use parking_lot::Mutex;

    /// A test middleware that records its invocation order.
    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn invoke<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                self.order.lock().push(format!("{}b", self.name));
                let result = next.run(ctx).await;
                self.order.lock().push(format!("{}a", self.name));
                result
            })
        }
    }

    fn tracker(name: &'static str, order: &Arc<Mutex<Vec<String>>>) -> OrderTrackingMiddleware {
        OrderTrackingMiddleware {
            name,
            order: Arc::clone(order),
        }
    }

    fn recording_handler(order: &Arc<Mutex<Vec<String>>>) -> impl Middleware {
        let order = Arc::clone(order);
        handler_fn("handler", move |_ctx| {
            order.lock().push("H".to_string());
            Box::pin(async { Ok(()) })
        })
    }

    fn ctx() -> MiddlewareContext {
        MiddlewareContext::detached(Request::default())
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_onion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .use_middleware(tracker("U1", &order))
            .use_middleware(tracker("U2", &order))
            .use_middleware(tracker("U3", &order))
            .build();

        pipeline
            .execute(&mut ctx(), &recording_handler(&order))
            .await
            .unwrap();

        assert_eq!(
            *order.lock(),
            vec!["U1b", "U2b", "U3b", "H", "U3a", "U2a", "U1a"]
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_continuation() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder().build();
        assert!(pipeline.is_empty());

        pipeline
            .execute(&mut ctx(), &recording_handler(&order))
            .await
            .unwrap();
        assert_eq!(*order.lock(), vec!["H"]);
    }

    #[tokio::test]
    async fn test_errors_propagate_unchanged() {
        let pipeline = Pipeline::builder()
            .use_middleware(crate::middleware::from_fn("fail", |_ctx, _next| {
                Box::pin(async { Err(ConduitError::conflict("version mismatch")) })
            }))
            .build();

        let handler = handler_fn("unreached", |_ctx| Box::pin(async { Ok(()) }));
        let err = pipeline.execute(&mut ctx(), &handler).await.unwrap_err();
        assert!(matches!(err, ConduitError::Conflict { .. }));
    }

    #[test]
    fn test_prepend_and_insert_positions() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .use_middleware(tracker("b", &order))
            .prepend(tracker("a2", &order))
            .prepend(tracker("a1", &order))
            .insert(1, tracker("mid", &order))
            .insert(99, tracker("last", &order))
            .build();

        assert_eq!(pipeline.unit_names(), vec!["a1", "mid", "a2", "b", "last"]);
    }

    #[test]
    fn test_prepend_all_keeps_batch_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let batch: Vec<BoxedMiddleware> = vec![
            Arc::new(tracker("x", &order)),
            Arc::new(tracker("y", &order)),
        ];
        let pipeline = Pipeline::builder()
            .use_middleware(tracker("z", &order))
            .prepend_all(batch)
            .build();

        assert_eq!(pipeline.unit_names(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_use_if_evaluated_at_build_time() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let builder = Pipeline::builder()
            .use_if(true, tracker("on", &order))
            .use_if(false, tracker("off", &order));

        assert_eq!(builder.len(), 1);
        assert_eq!(builder.compose().unit_names(), vec!["on"]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let original = Pipeline::builder().use_middleware(tracker("a", &order));
        let copy = original.snapshot().use_middleware(tracker("b", &order));

        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);
        assert!(copy.clear().is_empty());
        assert_eq!(original.len(), 1);
    }
}
