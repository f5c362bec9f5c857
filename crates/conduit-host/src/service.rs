//! Long-running background services.
//!
//! Services are spawned by [`Application::start`](crate::Application::start)
//! with the application's root scope ambient. They should watch the scope for
//! cancellation and return once it fires:
//!
//! ```rust
//! use conduit_core::context;
//! use conduit_host::service_fn;
//!
//! let poller = service_fn("poller", || async {
//!     let scope = context::current().expect("root scope is ambient");
//!     scope.cancelled().await;
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// A task that runs for the lifetime of the application.
pub trait BackgroundService: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs until done or until the root scope is cancelled.
    fn run(self: Arc<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// A background service backed by a closure.
pub struct ServiceFn<F> {
    name: String,
    f: F,
}

/// Creates a [`BackgroundService`] from a closure returning a future.
pub fn service_fn<F, Fut>(name: impl Into<String>, f: F) -> ServiceFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    ServiceFn {
        name: name.into(),
        f,
    }
}

impl<F, Fut> BackgroundService for ServiceFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin((self.f)())
    }
}

impl<F> std::fmt::Debug for ServiceFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceFn").field("name", &self.name).finish()
    }
}
