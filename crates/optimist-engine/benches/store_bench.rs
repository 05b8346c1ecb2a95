use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use optimist_core::{CacheKey, Domain, KeyKind, KeyParams, KeyPrefix, keys};
use optimist_engine::store::CacheStore;
use serde_json::{Value, json};

/// Crea una lista de prueba con N items
fn create_test_list(num_items: usize) -> Value {
    let items: Vec<Value> = (0..num_items)
        .map(|i| json!({"id": i.to_string(), "name": format!("client-{}", i), "status": "active"}))
        .collect();
    Value::Array(items)
}

fn page(n: usize) -> CacheKey {
    keys::list(Domain::clients(), KeyParams::new().with("page", n as i64))
}

/// Store con `pages` listas de clientes y sus detalles
fn create_store(pages: usize, items: usize) -> CacheStore {
    let store = CacheStore::new();
    for p in 0..pages {
        store.set(page(p), create_test_list(items));
    }
    for i in 0..items {
        store.set(
            keys::detail(Domain::clients(), &i.to_string().into()),
            json!({"id": i.to_string(), "name": format!("client-{}", i)}),
        );
    }
    store
}

/// Benchmark: Store get (hit)
fn bench_store_get_hit(c: &mut Criterion) {
    let store = create_store(10, 100);
    let key = page(5);

    c.bench_function("store_get_hit", |b| {
        b.iter(|| std::hint::black_box(store.get(&key)));
    });
}

/// Benchmark: Store get (miss)
fn bench_store_get_miss(c: &mut Criterion) {
    let store = create_store(10, 100);
    let key = page(999);

    c.bench_function("store_get_miss", |b| {
        b.iter(|| std::hint::black_box(store.get(&key)));
    });
}

/// Benchmark: patch optimista sobre todas las listas + restore
fn bench_patch_and_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch_and_restore");
    let prefix = KeyPrefix::kind(Domain::clients(), KeyKind::List);

    for pages in [1, 10, 50].iter() {
        let store = create_store(*pages, 50);
        group.throughput(Throughput::Elements(*pages as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, _| {
            b.iter(|| {
                let token = store.patch_many(&prefix, |_, data| {
                    if let Some(item) = data.get_mut(0) {
                        item["name"] = json!("patched");
                        return true;
                    }
                    false
                });
                store.restore(std::hint::black_box(token));
            });
        });
    }

    group.finish();
}

/// Benchmark: invalidacion por dominio
fn bench_invalidate_domain(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidate_domain");
    let prefix = KeyPrefix::domain(Domain::clients());

    for pages in [10, 100].iter() {
        let store = create_store(*pages, 10);
        group.throughput(Throughput::Elements(*pages as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), pages, |b, _| {
            b.iter(|| std::hint::black_box(store.invalidate(&prefix)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_store_get_hit,
    bench_store_get_miss,
    bench_patch_and_restore,
    bench_invalidate_domain,
);
criterion_main!(benches);
