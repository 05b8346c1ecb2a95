mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use helpers::*;
use optimist_core::{CacheKey, Domain, KeyParams, KeyPrefix, keys};
use optimist_engine::{
    CacheStore, EngineConfig, EngineMetrics, EntryState, FetchError, QueryExecutor, ReadOptions,
};
use optimist_remote::ScriptedRemote;
use serde_json::json;
use tokio::sync::oneshot;

fn executor() -> QueryExecutor {
    init_tracing();
    QueryExecutor::new(
        CacheStore::new(),
        Arc::new(EngineConfig::default()),
        EngineMetrics::new(),
    )
}

fn page(n: i64) -> CacheKey {
    keys::list(Domain::clients(), KeyParams::new().with("page", n))
}

async fn wait_until_fetching(executor: &QueryExecutor, key: &CacheKey) {
    while !executor.is_fetching(key) {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn concurrent_reads_share_one_fetch() {
    let executor = executor();
    let calls = Arc::new(AtomicUsize::new(0));

    let reads = (0..10).map(|_| {
        let calls = calls.clone();
        executor.read(
            page(1),
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(json!(["a", "b"]))
                }
            },
            ReadOptions::new(),
        )
    });
    let results = join_all(reads).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &Ok(json!(["a", "b"]))));
    assert_eq!(executor.store().get(&page(1)).unwrap().state(), EntryState::Fresh);
}

#[tokio::test]
async fn waiters_share_the_same_error() {
    let executor = executor();

    let reads = (0..3).map(|_| {
        executor.read(
            page(1),
            || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(FetchError::Unavailable("offline".into()))
            },
            ReadOptions::new(),
        )
    });
    let results = join_all(reads).await;

    for result in results {
        assert_eq!(result, Err(FetchError::Unavailable("offline".into())));
    }
    let entry = executor.store().get(&page(1)).unwrap();
    assert_eq!(entry.state(), EntryState::Error);
    assert!(entry.data().is_none());
}

#[tokio::test]
async fn superseded_fetch_cannot_overwrite_newer_data() {
    let executor = executor();
    let (release_old, old_gate) = oneshot::channel::<()>();

    let old = tokio::spawn({
        let executor = executor.clone();
        async move {
            executor
                .read(
                    page(1),
                    move || async move {
                        let _ = old_gate.await;
                        Ok(json!(["old"]))
                    },
                    ReadOptions::new(),
                )
                .await
        }
    });
    wait_until_fetching(&executor, &page(1)).await;

    let newer = executor
        .read(page(1), || async { Ok(json!(["new"])) }, ReadOptions::new().force())
        .await
        .unwrap();
    assert_eq!(newer, json!(["new"]));

    release_old.send(()).unwrap();
    assert_eq!(old.await.unwrap().unwrap(), json!(["old"]));

    let entry = executor.store().get(&page(1)).unwrap();
    assert_eq!(entry.data(), Some(&json!(["new"])));
    assert_eq!(entry.state(), EntryState::Fresh);
}

#[tokio::test]
async fn invalidation_during_fetch_discards_the_result() {
    let executor = executor();
    executor.store().set(page(1), json!(["cached"]));
    let (release, gate) = oneshot::channel::<()>();

    let pending = tokio::spawn({
        let executor = executor.clone();
        async move {
            executor
                .read(
                    page(1),
                    move || async move {
                        let _ = gate.await;
                        Ok(json!(["from before invalidation"]))
                    },
                    ReadOptions::new().force(),
                )
                .await
        }
    });
    wait_until_fetching(&executor, &page(1)).await;

    assert_eq!(
        executor
            .store()
            .invalidate(&KeyPrefix::domain(Domain::clients())),
        1
    );
    release.send(()).unwrap();
    pending.await.unwrap().unwrap();

    let entry = executor.store().get(&page(1)).unwrap();
    assert_eq!(entry.data(), Some(&json!(["cached"])));
    assert_eq!(entry.state(), EntryState::Stale);
    assert!(!executor.is_fetching(&page(1)));

    // El siguiente read refetchea
    let data = executor
        .read(page(1), || async { Ok(json!(["refetched"])) }, ReadOptions::new())
        .await
        .unwrap();
    assert_eq!(data, json!(["refetched"]));
}

#[tokio::test]
async fn invalidating_twice_equals_invalidating_once() {
    let store = CacheStore::new();
    store.set(page(1), json!([1]));
    store.set(page(2), json!([2]));
    store.set(keys::stats(Domain::dashboard(), "summary"), json!({"clients": 2}));
    let prefix = KeyPrefix::domain(Domain::clients());

    assert_eq!(store.invalidate(&prefix), 2);
    let once = store.entries();
    assert_eq!(store.invalidate(&prefix), 0);

    assert_eq!(store.entries(), once);
    assert_eq!(store.get(&page(1)).unwrap().state(), EntryState::Stale);
    assert_eq!(
        store
            .get(&keys::stats(Domain::dashboard(), "summary"))
            .unwrap()
            .state(),
        EntryState::Fresh
    );
}

#[tokio::test]
async fn background_refetch_runs_each_stale_query_once() {
    let executor = executor();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(json!(["fresh"]))
            }
        }
    };
    executor.register(page(1), fetcher);
    executor.store().set(page(1), json!(["old"]));

    executor.store().invalidate(&page(1));
    executor.store().invalidate(&page(1));
    let (first, second) = tokio::join!(executor.refetch_stale(), executor.refetch_stale());

    // La segunda pasada ve la key en fetching y no la repite
    assert_eq!(first + second, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.store().data(&page(1)), Some(json!(["fresh"])));
}

#[tokio::test]
async fn keep_previous_data_shows_last_page_while_loading() {
    let executor = executor();
    executor
        .read(page(1), || async { Ok(json!(["p1"])) }, ReadOptions::new())
        .await
        .unwrap();

    let (release, gate) = oneshot::channel::<()>();
    let loading = tokio::spawn({
        let executor = executor.clone();
        async move {
            executor
                .read(
                    page(2),
                    move || async move {
                        let _ = gate.await;
                        Ok(json!(["p2"]))
                    },
                    ReadOptions::new(),
                )
                .await
        }
    });
    wait_until_fetching(&executor, &page(2)).await;

    let options = ReadOptions::new().keep_previous_data(true);
    let view = executor.view(&page(2), &options);
    assert_eq!(view.state, EntryState::Fetching);
    assert!(view.is_placeholder);
    assert!(view.is_loading());
    assert_eq!(view.data, Some(json!(["p1"])));

    release.send(()).unwrap();
    loading.await.unwrap().unwrap();

    let view = executor.view(&page(2), &options);
    assert!(!view.is_placeholder);
    assert_eq!(view.data, Some(json!(["p2"])));
}

#[tokio::test]
async fn mutation_during_fetch_keeps_optimistic_data() {
    let remote = Arc::new(ScriptedRemote::new());
    let (engine, _) = engine(remote.clone());
    seed(&engine, &clients_list(), json!([client("1", "A")])).await;
    let (release, gate) = oneshot::channel::<()>();

    // Refetch en curso con datos del servidor previos a la mutacion
    let refetch = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .read(
                    clients_list(),
                    move || async move {
                        let _ = gate.await;
                        Ok(json!([client("1", "A")]))
                    },
                    ReadOptions::new().force(),
                )
                .await
        }
    });
    while engine.entry(&clients_list()).unwrap().state() != EntryState::Fetching {
        tokio::task::yield_now().await;
    }

    remote.hold();
    let update = tokio::spawn({
        let engine = engine.clone();
        async move { engine.update("clients", "1", json!({"name": "B"})).await }
    });
    remote.wait_for_calls(1).await;

    release.send(()).unwrap();
    refetch.await.unwrap().unwrap();
    assert_eq!(data(&engine, &clients_list())[0]["name"], "B");

    remote.release();
    update.await.unwrap().unwrap();
    assert_eq!(data(&engine, &clients_list())[0]["name"], "B");
}

#[tokio::test]
async fn typed_reads_decode_cached_data() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Client {
        id: String,
        name: String,
    }

    let executor = executor();
    let clients: Vec<Client> = executor
        .read_as(
            page(1),
            || async { Ok(json!([{"id": "1", "name": "Ann", "status": "active"}])) },
            ReadOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        clients,
        vec![Client {
            id: "1".to_string(),
            name: "Ann".to_string()
        }]
    );
}
