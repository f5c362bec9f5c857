//! Integration tests for ambient context propagation across tasks and timers.

use conduit_core::context::{self, ScopeValues};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn read(key: &str) -> Option<String> {
    context::get::<String>(key).map(|v| v.as_str().to_owned())
}

#[tokio::test(start_paused = true)]
async fn timers_and_spawned_work_keep_their_scope() {
    let results = futures_util::future::join_all((0..4).map(|i| {
        context::run(
            ScopeValues::new().with("request", format!("req-{i}")),
            async move {
                // A detached timer callback scheduled from inside the scope.
                let timer = context::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5 * (4 - i))).await;
                    read("request")
                });
                tokio::time::sleep(Duration::from_millis(3 * i)).await;
                let own = read("request");
                (own, timer.await.ok().flatten())
            },
        )
    }))
    .await;

    for (i, (own, from_timer)) in results.into_iter().enumerate() {
        let expected = format!("req-{i}");
        assert_eq!(own.as_deref(), Some(expected.as_str()));
        assert_eq!(from_timer.as_deref(), Some(expected.as_str()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn isolation_holds_on_multi_thread_runtime() {
    let handles: Vec<_> = (0..32_u32)
        .map(|i| {
            tokio::spawn(context::run(ScopeValues::new().with("n", i), async move {
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                    assert_eq!(context::get::<u32>("n").as_deref(), Some(&i));
                }
                context::current().map(|scope| scope.id())
            }))
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 32);
}

#[tokio::test(start_paused = true)]
async fn continuation_outliving_its_runs_still_sees_inherited_values() {
    let pending = context::run(ScopeValues::new().with("tenant", "acme".to_string()), async {
        context::run(ScopeValues::new().with("inner", 1_u32), async {
            context::spawn(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                (context::has("inner"), read("tenant"))
            })
        })
        .await
    })
    .await;

    let (inner, tenant) = pending.await.unwrap();
    assert!(inner);
    assert_eq!(tenant.as_deref(), Some("acme"));
}

#[tokio::test]
async fn scope_cancellation_is_visible_to_spawned_work() {
    context::run(ScopeValues::new(), async {
        let scope = context::current().unwrap();
        let worker = context::spawn(async {
            let scope = context::current().unwrap();
            scope.cancelled().await;
            context::is_cancelled()
        });

        tokio::task::yield_now().await;
        scope.cancel();
        assert!(worker.await.unwrap());
    })
    .await;
}

proptest! {
    /// For any layering of writes, a child sees its own values first, then
    /// its ancestors', and leaving a child never leaks its writes upward.
    #[test]
    fn nested_shadowing(layers in prop::collection::vec(
        prop::collection::hash_map("[a-d]", "[a-z]{1,4}", 0..4),
        1..5,
    )) {
        let seen = nested(&layers, 0);
        let mut expected: HashMap<String, String> = HashMap::new();
        for layer in &layers {
            expected.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        prop_assert_eq!(seen, expected);
    }
}

fn nested(layers: &[HashMap<String, String>], depth: usize) -> HashMap<String, String> {
    let Some(layer) = layers.get(depth) else {
        return ["a", "b", "c", "d"]
            .iter()
            .filter_map(|k| read(k).map(|v| ((*k).to_string(), v)))
            .collect();
    };

    let values: ScopeValues = layer
        .iter()
        .map(|(k, v)| (k.clone(), Arc::new(v.clone()) as context::Value))
        .collect();

    let before: Vec<Option<String>> = ["a", "b", "c", "d"].iter().map(|k| read(k)).collect();
    let inner = context::run_sync(values, || nested(layers, depth + 1));
    let after: Vec<Option<String>> = ["a", "b", "c", "d"].iter().map(|k| read(k)).collect();
    assert_eq!(before, after);
    inner
}
