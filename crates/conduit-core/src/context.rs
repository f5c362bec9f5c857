//! Ambient, tree-scoped context propagation.
//!
//! A [`Scope`] is a node in a tree of key/value maps. The scope that is
//! *ambient* for a piece of code is determined by the tokio task executing it:
//! [`run`] binds a new child scope for the whole asynchronous lifetime of the
//! body it is given, including everything the body awaits and timers it sets.
//! Work handed to [`spawn`] or [`bind`] carries the ambient scope with it.
//! Independent concurrent executions never observe each other's scope.
//!
//! Lookups walk the parent chain, so a child sees every value of its
//! ancestors unless it shadows the key. Writes always land in the current
//! scope and never mutate an ancestor.
//!
//! # Example
//!
//! ```
//! use conduit_core::context::{self, ScopeValues};
//!
//! # tokio_test::block_on(async {
//! let user = context::run(ScopeValues::new().with("user", "alice".to_string()), async {
//!     context::run(ScopeValues::new(), async {
//!         // Missing in the inner scope, found in the outer one.
//!         context::get::<String>("user").map(|u| u.as_str().to_owned())
//!     })
//!     .await
//! })
//! .await;
//!
//! assert_eq!(user.as_deref(), Some("alice"));
//! assert!(context::current().is_none());
//! # });
//! ```

use crate::error::{ConduitError, ConduitResult};
use futures_util::future::Either;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT: Arc<Scope>;
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// A type-erased value stored in a scope.
pub type Value = Arc<dyn Any + Send + Sync>;

type CancelCallback = Box<dyn FnOnce() + Send>;

/// Initial values used to seed a new scope.
///
/// # Example
///
/// ```
/// use conduit_core::context::ScopeValues;
///
/// let values = ScopeValues::new()
///     .with("tenant", "acme".to_string())
///     .with("attempt", 1_u32);
/// assert_eq!(values.len(), 2);
/// ```
#[derive(Default, Clone)]
pub struct ScopeValues {
    values: HashMap<String, Value>,
}

impl ScopeValues {
    /// Creates an empty set of values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed value.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.values.insert(key.into(), Arc::new(value));
        self
    }

    /// Adds an already type-erased value.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for ScopeValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, Value>> for ScopeValues {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl fmt::Debug for ScopeValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeValues")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A node in the context tree.
///
/// Scopes are shared through `Arc`. A child keeps its parent alive, so a
/// continuation that outlives the `run` that created its ancestors still
/// sees their values. Parents never hold their children.
pub struct Scope {
    id: u64,
    depth: usize,
    values: RwLock<HashMap<String, Value>>,
    parent: Option<Arc<Scope>>,
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<CancelCallback>>,
    notify: Notify,
}

impl Scope {
    fn new(values: ScopeValues, parent: Option<&Arc<Self>>) -> Arc<Self> {
        let scope = Arc::new(Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            depth: parent.map_or(0, |p| p.depth + 1),
            values: RwLock::new(values.values),
            parent: parent.map(Arc::clone),
            cancelled: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        tracing::debug!(
            scope_id = scope.id,
            parent_id = parent.map(|p| p.id),
            depth = scope.depth,
            "context scope created"
        );
        scope
    }

    /// Creates a root scope with no parent.
    #[must_use]
    pub fn root(values: ScopeValues) -> Arc<Self> {
        Self::new(values, None)
    }

    /// Creates a child of this scope.
    #[must_use]
    pub fn child(self: &Arc<Self>, values: ScopeValues) -> Arc<Self> {
        Self::new(values, Some(self))
    }

    /// Process-unique identifier of this scope.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Distance from the root (a root scope has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the parent scope, if this is not a root.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.clone()
    }

    /// Keys set directly on this scope (ancestors excluded).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Looks up a value, walking the parent chain.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.read().get(key) {
            return Some(Arc::clone(value));
        }
        self.parent.as_ref().and_then(|parent| parent.get_value(key))
    }

    /// Looks up a typed value, walking the parent chain.
    ///
    /// Returns `None` if the key is missing or holds a different type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_value(key)
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Returns `true` if the key is visible from this scope.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        if self.values.read().contains_key(key) {
            return true;
        }
        self.parent.as_ref().is_some_and(|parent| parent.has(key))
    }

    /// Sets a value on this scope, shadowing any ancestor value.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.set_value(key, Arc::new(value));
    }

    /// Sets an already type-erased value on this scope.
    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        self.values.write().insert(key.into(), value);
    }

    /// Removes a key from this scope only.
    ///
    /// An ancestor's value for the same key becomes visible again. Returns
    /// `true` if the key was present on this scope.
    pub fn delete(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Registers a callback to run when this scope is cancelled.
    ///
    /// If the scope is already cancelled the callback runs immediately on the
    /// calling thread.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut callbacks = self.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        self.invoke_callback(0, Box::new(callback));
    }

    /// Cancels this scope.
    ///
    /// The first call flips the flag, wakes [`cancelled`](Self::cancelled)
    /// waiters and runs the registered callbacks once, in registration order.
    /// A panicking callback is logged and does not stop the others. Later
    /// calls do nothing. Parent and child scopes are not affected.
    pub fn cancel(&self) {
        let callbacks = {
            let mut callbacks = self.callbacks.lock();
            if self.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *callbacks)
        };

        tracing::debug!(
            scope_id = self.id,
            callbacks = callbacks.len(),
            "context scope cancelled"
        );
        self.notify.notify_waiters();

        for (index, callback) in callbacks.into_iter().enumerate() {
            self.invoke_callback(index, callback);
        }
    }

    fn invoke_callback(&self, index: usize, callback: CancelCallback) {
        if std::panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            tracing::warn!(scope_id = self.id, index, "cancel callback panicked");
        }
    }

    /// Resolves once this scope is cancelled.
    ///
    /// Long-running units can `select!` on this to stop cooperatively.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("keys", &self.keys())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Returns the ambient scope of the calling task, if any.
#[must_use]
pub fn current() -> Option<Arc<Scope>> {
    CURRENT.try_with(Arc::clone).ok()
}

fn require_current() -> ConduitResult<Arc<Scope>> {
    current().ok_or(ConduitError::NoActiveScope)
}

/// Runs `body` inside a new scope seeded with `values`.
///
/// The new scope is a child of the ambient scope, or a root when there is
/// none. It stays ambient for everything `body` awaits. When `body`
/// completes, the previous ambient scope is current again.
pub async fn run<F>(values: ScopeValues, body: F) -> F::Output
where
    F: Future,
{
    let scope = match current() {
        Some(parent) => parent.child(values),
        None => Scope::root(values),
    };
    CURRENT.scope(scope, body).await
}

/// Synchronous variant of [`run`].
pub fn run_sync<F, T>(values: ScopeValues, body: F) -> T
where
    F: FnOnce() -> T,
{
    let scope = match current() {
        Some(parent) => parent.child(values),
        None => Scope::root(values),
    };
    CURRENT.sync_scope(scope, body)
}

/// Runs `body` with an existing scope ambient.
pub async fn enter<F>(scope: Arc<Scope>, body: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(scope, body).await
}

/// Looks up a typed value in the ambient scope chain.
#[must_use]
pub fn get<T: Any + Send + Sync>(key: &str) -> Option<Arc<T>> {
    current().and_then(|scope| scope.get::<T>(key))
}

/// Looks up a type-erased value in the ambient scope chain.
#[must_use]
pub fn get_value(key: &str) -> Option<Value> {
    current().and_then(|scope| scope.get_value(key))
}

/// Returns `true` if `key` is visible from the ambient scope.
#[must_use]
pub fn has(key: &str) -> bool {
    current().is_some_and(|scope| scope.has(key))
}

/// Sets a value on the ambient scope.
pub fn set<T: Any + Send + Sync>(key: impl Into<String>, value: T) -> ConduitResult<()> {
    require_current()?.set(key, value);
    Ok(())
}

/// Removes a key from the ambient scope only.
pub fn delete(key: &str) -> ConduitResult<bool> {
    Ok(require_current()?.delete(key))
}

/// Registers a cancel callback on the ambient scope.
pub fn on_cancel<F>(callback: F) -> ConduitResult<()>
where
    F: FnOnce() + Send + 'static,
{
    require_current()?.on_cancel(callback);
    Ok(())
}

/// Cancels the ambient scope.
pub fn cancel() -> ConduitResult<()> {
    require_current()?.cancel();
    Ok(())
}

/// Returns `true` if the ambient scope exists and is cancelled.
#[must_use]
pub fn is_cancelled() -> bool {
    current().is_some_and(|scope| scope.is_cancelled())
}

/// Spawns a task that inherits the ambient scope.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(scope) => tokio::spawn(CURRENT.scope(scope, future)),
        None => tokio::spawn(future),
    }
}

/// Binds `future` to the ambient scope captured now.
///
/// The returned future may be polled later, from any task, and still sees the
/// captured scope.
pub fn bind<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    match current() {
        Some(scope) => Either::Left(CURRENT.scope(scope, future)),
        None => Either::Right(future),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn seeded(key: &str, value: &str) -> ScopeValues {
        ScopeValues::new().with(key, value.to_string())
    }

    fn get_string(key: &str) -> Option<String> {
        get::<String>(key).map(|v| v.as_str().to_owned())
    }

    #[tokio::test]
    async fn test_no_scope_outside_run() {
        assert!(current().is_none());
        assert!(get_string("missing").is_none());
        assert!(!has("missing"));
        assert!(!is_cancelled());
        assert!(matches!(set("k", 1_u8), Err(ConduitError::NoActiveScope)));
        assert!(matches!(delete("k"), Err(ConduitError::NoActiveScope)));
        assert!(matches!(cancel(), Err(ConduitError::NoActiveScope)));
        assert!(matches!(on_cancel(|| {}), Err(ConduitError::NoActiveScope)));
    }

    #[tokio::test]
    async fn test_run_returns_body_result() {
        let value = run(seeded("k", "v"), async { get_string("k") }).await;
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_nested_run_restores_parent() {
        run(seeded("user", "outer"), async {
            run(ScopeValues::new(), async {
                set("user", "inner".to_string()).unwrap();
                set("only_inner", true).unwrap();
                assert_eq!(get_string("user").as_deref(), Some("inner"));
            })
            .await;

            assert_eq!(get_string("user").as_deref(), Some("outer"));
            assert!(!has("only_inner"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_lookup_walks_parent_chain() {
        run(seeded("a", "1"), async {
            run(seeded("b", "2"), async {
                run(ScopeValues::new(), async {
                    assert_eq!(get_string("a").as_deref(), Some("1"));
                    assert_eq!(get_string("b").as_deref(), Some("2"));
                    let scope = current().unwrap();
                    assert_eq!(scope.depth(), 2);
                    assert!(scope.keys().is_empty());
                })
                .await;
            })
            .await;
        })
        .await;
    }

    #[tokio::test]
    async fn test_delete_only_touches_current_scope() {
        run(seeded("k", "parent"), async {
            run(ScopeValues::new(), async {
                set("k", "child".to_string()).unwrap();
                assert!(delete("k").unwrap());
                assert_eq!(get_string("k").as_deref(), Some("parent"));
                assert!(!delete("k").unwrap());
            })
            .await;
            assert_eq!(get_string("k").as_deref(), Some("parent"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_typed_get_mismatch_is_none() {
        run(ScopeValues::new().with("n", 5_u32), async {
            assert!(get::<String>("n").is_none());
            assert_eq!(get::<u32>("n").as_deref(), Some(&5));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_scopes_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..8_u64 {
            handles.push(tokio::spawn(run(
                ScopeValues::new().with("id", i),
                async move {
                    tokio::time::sleep(Duration::from_millis(10 * (8 - i))).await;
                    let seen = *get::<u64>("id").unwrap();
                    set("id", seen * 100).unwrap();
                    tokio::task::yield_now().await;
                    (i, *get::<u64>("id").unwrap())
                },
            )));
        }

        for handle in handles {
            let (i, seen) = handle.await.unwrap();
            assert_eq!(seen, i * 100);
        }
    }

    #[tokio::test]
    async fn test_interleaved_runs_on_one_task() {
        let a = run(seeded("who", "a"), async {
            tokio::task::yield_now().await;
            get_string("who")
        });
        let b = run(seeded("who", "b"), async {
            tokio::task::yield_now().await;
            get_string("who")
        });

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.as_deref(), Some("a"));
        assert_eq!(b.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_spawn_inherits_scope() {
        let seen = run(seeded("k", "v"), async {
            spawn(async { get_string("k") }).await.unwrap()
        })
        .await;
        assert_eq!(seen.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_bind_carries_scope_out() {
        let bound = run(seeded("k", "captured"), async { bind(async { get_string("k") }) }).await;
        assert!(current().is_none());
        assert_eq!(bound.await.as_deref(), Some("captured"));
    }

    #[tokio::test]
    async fn test_enter_existing_scope() {
        let scope = Scope::root(seeded("k", "entered"));
        let seen = enter(Arc::clone(&scope), async { current().map(|s| s.id()) }).await;
        assert_eq!(seen, Some(scope.id()));
    }

    #[test]
    fn test_run_sync() {
        let value = run_sync(seeded("k", "sync"), || {
            run_sync(ScopeValues::new(), || get_string("k"))
        });
        assert_eq!(value.as_deref(), Some("sync"));
        assert!(current().is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let scope = Scope::root(ScopeValues::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        scope.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        scope.cancel();
        scope.cancel();

        assert!(scope.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let scope = Scope::root(ScopeValues::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scope.on_cancel(move || order.lock().push(i));
        }
        scope.cancel();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let scope = Scope::root(ScopeValues::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        scope.on_cancel(|| panic!("callback failure"));
        scope.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        scope.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancel_fires_immediately() {
        let scope = Scope::root(ScopeValues::new());
        scope.cancel();

        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        scope.on_cancel(move || f.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_does_not_cascade() {
        let parent = Scope::root(ScopeValues::new());
        let child = parent.child(ScopeValues::new());

        parent.cancel();
        assert!(!child.is_cancelled());

        let other = Scope::root(ScopeValues::new());
        let grandchild = other.child(ScopeValues::new()).child(ScopeValues::new());
        grandchild.cancel();
        assert!(!other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let scope = Scope::root(ScopeValues::new());
        let waiter = {
            let scope = Arc::clone(&scope);
            tokio::spawn(async move { scope.cancelled().await })
        };
        tokio::task::yield_now().await;
        scope.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();

        // Already cancelled: resolves at once.
        scope.cancelled().await;
    }

    #[tokio::test]
    async fn test_ambient_cancel() {
        run(ScopeValues::new(), async {
            let fired = Arc::new(AtomicBool::new(false));
            let f = Arc::clone(&fired);
            on_cancel(move || f.store(true, Ordering::SeqCst)).unwrap();
            assert!(!is_cancelled());
            cancel().unwrap();
            assert!(is_cancelled());
            assert!(fired.load(Ordering::SeqCst));
        })
        .await;
    }

    #[test]
    fn test_child_keeps_parent_alive() {
        let parent = Scope::root(seeded("k", "v"));
        let parent_id = parent.id();
        let child = parent.child(ScopeValues::new());
        assert_eq!(child.parent().map(|p| p.id()), Some(parent_id));

        drop(parent);
        assert_eq!(child.parent().map(|p| p.id()), Some(parent_id));
        assert!(child.has("k"));
        assert_eq!(child.get::<String>("k").as_deref().map(String::as_str), Some("v"));
    }
}
