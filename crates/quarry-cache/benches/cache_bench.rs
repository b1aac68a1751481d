//! Cache benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quarry_cache::lru::{LruCache, SyncLruCache};

fn query_key(i: usize) -> String {
    format!("SELECT * FROM items WHERE id = {}", i)
}

fn lru_insert_benchmark(c: &mut Criterion) {
    c.bench_function("lru_insert_1000", |b| {
        b.iter(|| {
            let mut cache = LruCache::new(100);
            for i in 0..1000 {
                cache.insert(i, i * 2);
            }
            black_box(cache.len())
        })
    });
}

fn lru_hit_benchmark(c: &mut Criterion) {
    let mut cache = LruCache::new(100);
    for i in 0..100 {
        cache.insert(query_key(i), i);
    }
    let keys: Vec<_> = (0..100).map(query_key).collect();

    c.bench_function("lru_hit_100_string_keys", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(cache.get(key.as_str()));
            }
        })
    });
}

fn sync_lru_churn_benchmark(c: &mut Criterion) {
    let cache = SyncLruCache::new(100);

    c.bench_function("sync_lru_churn_200", |b| {
        b.iter(|| {
            for i in 0..200 {
                if cache.get(&i).is_none() {
                    cache.insert(i, i);
                }
            }
            black_box(cache.len())
        })
    });
}

criterion_group!(
    benches,
    lru_insert_benchmark,
    lru_hit_benchmark,
    sync_lru_churn_benchmark
);
criterion_main!(benches);
