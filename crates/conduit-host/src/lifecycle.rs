//! Lifecycle hooks for application startup and shutdown.
//!
//! Hooks run with the application's root scope ambient, so a startup hook
//! can seed values every later unit of work inherits:
//!
//! ```rust
//! use conduit_core::context;
//! use conduit_host::{Lifecycle, LifecycleError};
//!
//! let lifecycle = Lifecycle::new()
//!     .on_startup(|| async {
//!         context::set("region", "eu-west-1".to_string()).map_err(LifecycleError::from)
//!     })
//!     .on_shutdown(|| async { Ok(()) });
//! assert_eq!(lifecycle.startup_hook_count(), 1);
//! ```
//!
//! # Execution Order
//!
//! - **Startup hooks**: registration order, stopping at the first failure
//! - **Shutdown hooks**: reverse registration order, all of them, failures collected

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use conduit_core::ConduitError;
use futures_util::future::BoxFuture;
use thiserror::Error;

/// Error type for host lifecycle failures.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A startup hook failed.
    #[error("Startup hook failed: {0}")]
    StartupFailed(String),

    /// One or more shutdown hooks failed.
    #[error("Shutdown hook failed: {0}")]
    ShutdownFailed(String),

    /// `start` was called twice.
    #[error("Application already started")]
    AlreadyStarted,

    /// The application was built without a terminal handler.
    #[error("Application has no terminal handler")]
    MissingHandler,

    /// Generic hook error with source.
    #[error("Lifecycle hook error: {message}")]
    HookError {
        /// Error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl LifecycleError {
    /// Creates a new hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::HookError {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new hook error with a source.
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::HookError {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<ConduitError> for LifecycleError {
    fn from(error: ConduitError) -> Self {
        Self::with_source(error.to_string(), error)
    }
}

/// Result type for lifecycle hooks.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;

/// A lifecycle hook callback.
pub type LifecycleHook = Arc<dyn Fn() -> BoxFuture<'static, LifecycleResult> + Send + Sync>;

/// Startup and shutdown hooks for an [`Application`](crate::Application).
#[must_use]
#[derive(Clone, Default)]
pub struct Lifecycle {
    startup_hooks: Vec<(String, LifecycleHook)>,
    shutdown_hooks: Vec<(String, LifecycleHook)>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("startup_hooks", &self.startup_hooks.len())
            .field("shutdown_hooks", &self.shutdown_hooks.len())
            .finish()
    }
}

impl Lifecycle {
    /// Creates a new empty lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a startup hook.
    pub fn on_startup<F, Fut>(self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("startup_{}", self.startup_hooks.len());
        self.on_startup_named(name, hook)
    }

    /// Registers a named startup hook.
    pub fn on_startup_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move || Box::pin(hook()));
        self.startup_hooks.push((name.into(), hook));
        self
    }

    /// Registers a shutdown hook.
    pub fn on_shutdown<F, Fut>(self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let name = format!("shutdown_{}", self.shutdown_hooks.len());
        self.on_shutdown_named(name, hook)
    }

    /// Registers a named shutdown hook.
    pub fn on_shutdown_named<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: LifecycleHook = Arc::new(move || Box::pin(hook()));
        self.shutdown_hooks.push((name.into(), hook));
        self
    }

    /// Returns the number of startup hooks.
    pub fn startup_hook_count(&self) -> usize {
        self.startup_hooks.len()
    }

    /// Returns the number of shutdown hooks.
    pub fn shutdown_hook_count(&self) -> usize {
        self.shutdown_hooks.len()
    }

    /// Runs all startup hooks in registration order.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::StartupFailed` for the first hook that fails;
    /// later hooks do not run.
    pub async fn run_startup(&self) -> LifecycleResult {
        for (name, hook) in &self.startup_hooks {
            tracing::debug!(hook = %name, "Running startup hook");
            if let Err(e) = hook().await {
                tracing::error!(hook = %name, error = %e, "Startup hook failed");
                return Err(LifecycleError::StartupFailed(format!(
                    "Hook '{}' failed: {}",
                    name, e
                )));
            }
        }
        Ok(())
    }

    /// Runs all shutdown hooks in reverse registration order.
    ///
    /// Every hook runs even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::ShutdownFailed` summarizing every failure.
    pub async fn run_shutdown(&self) -> LifecycleResult {
        let mut errors: Vec<String> = Vec::new();

        for (name, hook) in self.shutdown_hooks.iter().rev() {
            tracing::debug!(hook = %name, "Running shutdown hook");
            if let Err(e) = hook().await {
                tracing::error!(hook = %name, error = %e, "Shutdown hook failed");
                errors.push(format!("{}: {}", name, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ShutdownFailed(errors.join("; ")))
        }
    }
}
