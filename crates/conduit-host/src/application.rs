//! The application runner.
//!
//! An [`Application`] owns a root scope, a pipeline and a terminal handler.
//! Adapters hand it normalized requests through [`Application::handle`];
//! each request runs in its own child scope of the root.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use conduit_config::HostConfig;
use conduit_core::context::{self, Scope, ScopeValues};
use conduit_core::{Request, Response};
use conduit_middleware::stages::request_id::REQUEST_ID_KEY;
use conduit_middleware::{BoxedMiddleware, Middleware, MiddlewareContext, Pipeline};
use conduit_telemetry::metrics::{self, InFlightGuard};
use futures_util::future::join_all;
use http::StatusCode;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleResult};
use crate::service::BackgroundService;
use crate::shutdown::ShutdownSignal;

/// The root scope key holding the configured service name.
pub const SERVICE_NAME_KEY: &str = "service_name";

/// A configured pipeline host.
///
/// # Example
///
/// ```rust
/// use conduit_core::{Request, Response};
/// use conduit_host::Application;
/// use conduit_middleware::handler_fn;
///
/// # tokio_test::block_on(async {
/// let app = Application::builder()
///     .handler(handler_fn("hello", |ctx| {
///         Box::pin(async move {
///             ctx.response_mut().set_body(serde_json::json!("hello"));
///             Ok(())
///         })
///     }))
///     .build()
///     .unwrap();
///
/// let response: Response = app.handle(Request::default()).await;
/// assert_eq!(response.body, serde_json::json!("hello"));
/// # });
/// ```
pub struct Application {
    config: HostConfig,
    pipeline: Pipeline,
    handler: BoxedMiddleware,
    lifecycle: Lifecycle,
    services: Vec<Arc<dyn BackgroundService>>,
    root: Arc<Scope>,
    running: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    signal: ShutdownSignal,
}

impl Application {
    /// Creates a new application builder.
    #[must_use]
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Returns the host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Returns the root scope every request scope descends from.
    pub fn root_scope(&self) -> &Arc<Scope> {
        &self.root
    }

    /// Returns the pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns a handle that stops [`run_until`](Self::run_until) when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Runs one unit of work through the pipeline and returns its response.
    ///
    /// The request gets a fresh scope, a child of the root, seeded with its
    /// request ID. Errors that escape every boundary become a 500 response
    /// with a generic body.
    pub async fn handle(&self, request: Request) -> Response {
        let _in_flight = InFlightGuard::new();
        let protocol = request.protocol.to_string();
        let scope = self
            .root
            .child(ScopeValues::new().with(REQUEST_ID_KEY, request.id));
        let mut ctx = MiddlewareContext::new(Arc::clone(&scope), request);

        let result = context::enter(
            scope,
            self.pipeline.execute(&mut ctx, self.handler.as_ref()),
        )
        .await;

        if let Err(error) = result {
            let category = error.category().as_str();
            tracing::error!(
                request_id = %ctx.request_id(),
                category,
                error = %error,
                "unhandled pipeline error"
            );
            metrics::record_unhandled_error(category);
            ctx.response_mut()
                .set_status(StatusCode::INTERNAL_SERVER_ERROR)
                .set_body(serde_json::json!({ "error": "internal" }));
        }

        let elapsed = ctx.elapsed();
        let response = ctx.into_response();
        metrics::record_request(&protocol, response.status.as_u16(), elapsed);
        response
    }

    /// Runs startup hooks, then spawns background services in the root scope.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::AlreadyStarted` on a second call, or the
    /// first startup hook failure. Services are not spawned if a hook fails.
    pub async fn start(&self) -> LifecycleResult {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyStarted);
        }

        tracing::info!(
            service = %self.config.service_name,
            environment = %self.config.environment,
            units = self.pipeline.len(),
            "starting application"
        );

        context::enter(Arc::clone(&self.root), self.lifecycle.run_startup()).await?;

        let running: Vec<JoinHandle<()>> = self
            .services
            .iter()
            .map(|service| {
                let service = Arc::clone(service);
                tokio::spawn(context::enter(Arc::clone(&self.root), run_service(service)))
            })
            .collect();

        metrics::set_background_services(running.len());
        *self.running.lock() = running;
        Ok(())
    }

    /// Stops the application.
    ///
    /// Cancels the root scope, waits up to the shutdown timeout for
    /// background services (aborting stragglers), then runs shutdown hooks
    /// in reverse order.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::ShutdownFailed` if any shutdown hook fails.
    pub async fn shutdown(&self) -> LifecycleResult {
        tracing::info!(service = %self.config.service_name, "shutting down application");
        self.signal.trigger();
        self.root.cancel();

        let mut handles = std::mem::take(&mut *self.running.lock());
        if !handles.is_empty() {
            let grace = self.config.shutdown_timeout();
            let finished = tokio::time::timeout(grace, join_all(handles.iter_mut()))
                .await
                .is_ok();
            if !finished {
                let stuck = handles.iter().filter(|h| !h.is_finished()).count();
                tracing::warn!(
                    stuck,
                    grace_secs = grace.as_secs(),
                    "background services did not stop in time, aborting"
                );
                for handle in &handles {
                    handle.abort();
                }
            }
        }
        metrics::set_background_services(0);

        context::enter(Arc::clone(&self.root), self.lifecycle.run_shutdown()).await
    }

    /// Starts the application, waits for `signal` or the built-in shutdown
    /// signal, then shuts down.
    pub async fn run_until<F>(&self, signal: F) -> LifecycleResult
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        tokio::select! {
            () = signal => {}
            () = self.signal.recv() => {}
        }
        self.shutdown().await
    }
}

async fn run_service(service: Arc<dyn BackgroundService>) {
    let name = service.name().to_string();
    tracing::debug!(service = %name, "background service started");
    match service.run().await {
        Ok(()) => tracing::debug!(service = %name, "background service stopped"),
        Err(e) => tracing::error!(service = %name, error = %e, "background service failed"),
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("handler", &self.handler.name())
            .field("lifecycle", &self.lifecycle)
            .field("services", &self.services.len())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Application`].
#[must_use]
#[derive(Default)]
pub struct ApplicationBuilder {
    config: HostConfig,
    pipeline: Option<Pipeline>,
    handler: Option<BoxedMiddleware>,
    lifecycle: Lifecycle,
    services: Vec<Arc<dyn BackgroundService>>,
    root_values: ScopeValues,
}

impl ApplicationBuilder {
    /// Creates a builder with default configuration and an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host configuration.
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the pipeline every request runs through.
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the terminal handler invoked at the end of the pipeline.
    pub fn handler<M: Middleware>(mut self, handler: M) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replaces the lifecycle hooks.
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Adds a startup hook.
    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        self.lifecycle = self.lifecycle.on_startup(hook);
        self
    }

    /// Adds a shutdown hook.
    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        self.lifecycle = self.lifecycle.on_shutdown(hook);
        self
    }

    /// Adds a background service.
    pub fn service<S: BackgroundService>(mut self, service: S) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    /// Seeds a value into the root scope.
    pub fn root_value<T>(mut self, key: impl Into<String>, value: T) -> Self
    where
        T: std::any::Any + Send + Sync,
    {
        self.root_values = self.root_values.with(key, value);
        self
    }

    /// Builds the application.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::MissingHandler` if no handler was set.
    pub fn build(self) -> LifecycleResult<Application> {
        let handler = self.handler.ok_or(LifecycleError::MissingHandler)?;
        let root_values = self
            .root_values
            .with(SERVICE_NAME_KEY, self.config.service_name.clone());

        Ok(Application {
            pipeline: self.pipeline.unwrap_or_else(|| Pipeline::builder().build()),
            handler,
            lifecycle: self.lifecycle,
            services: self.services,
            root: Scope::root(root_values),
            running: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            signal: ShutdownSignal::new(),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{ConduitError, RequestId};
    use conduit_middleware::handler_fn;

    fn ok_handler() -> impl Middleware {
        handler_fn("ok", |_ctx| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_build_requires_handler() {
        let result = Application::builder().build();
        assert!(matches!(result, Err(LifecycleError::MissingHandler)));
    }

    #[test]
    fn test_root_scope_seeded() {
        let app = Application::builder()
            .config(HostConfig {
                service_name: "orders".to_string(),
                ..Default::default()
            })
            .root_value("region", "eu".to_string())
            .handler(ok_handler())
            .build()
            .unwrap();

        let root = app.root_scope();
        assert_eq!(root.get::<String>(SERVICE_NAME_KEY).as_deref().map(String::as_str), Some("orders"));
        assert!(root.has("region"));
        assert!(app.pipeline().is_empty());
    }

    #[tokio::test]
    async fn test_request_scope_is_child_of_root() {
        let app = Application::builder()
            .root_value("region", "eu".to_string())
            .handler(handler_fn("probe", |ctx| {
                Box::pin(async move {
                    let region = context::get::<String>("region").map(|r| r.as_str().to_owned());
                    let id = context::get::<RequestId>(REQUEST_ID_KEY).map(|id| id.to_string());
                    let depth = ctx.scope().depth();
                    ctx.response_mut()
                        .set_body(serde_json::json!({ "region": region, "id": id, "depth": depth }));
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        let request = Request::default();
        let id = request.id.to_string();
        let response = app.handle(request).await;

        assert_eq!(response.body["region"], "eu");
        assert_eq!(response.body["id"], serde_json::json!(id));
        assert_eq!(response.body["depth"], 1);
    }

    #[tokio::test]
    async fn test_unhandled_error_becomes_generic_failure() {
        let app = Application::builder()
            .handler(handler_fn("boom", |ctx| {
                Box::pin(async move {
                    ctx.response_mut().set_body(serde_json::json!({ "secret": "detail" }));
                    Err(ConduitError::internal("database exploded"))
                })
            }))
            .build()
            .unwrap();

        let response = app.handle(Request::default()).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, serde_json::json!({ "error": "internal" }));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let app = Application::builder().handler(ok_handler()).build().unwrap();
        app.start().await.unwrap();
        assert!(matches!(app.start().await, Err(LifecycleError::AlreadyStarted)));
        app.shutdown().await.unwrap();
    }
}
