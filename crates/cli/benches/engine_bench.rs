use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Config, Engine};
use std::path::Path;
use tempfile::tempdir;

const N: usize = 1_000;
const VAL_SIZE: usize = 100;

fn bench_config(dir: &Path, mem_size_threshold: usize) -> Config {
    Config {
        mem_size_threshold,
        // Write amplification from fsync-per-append would dominate every
        // number here; the durability cost is measured in wal_bench instead.
        sync_writes: false,
        ..Config::in_dir(dir)
    }
}

fn engine_set_no_flush(c: &mut Criterion) {
    c.bench_function("engine_set_no_flush_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = Engine::open(bench_config(dir.path(), usize::MAX)).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    let key = format!("k{}", i).into_bytes();
                    store.set(&key, &vec![b'x'; VAL_SIZE]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_set_with_flush(c: &mut Criterion) {
    c.bench_function("engine_set_with_flush_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = Engine::open(bench_config(dir.path(), 4096)).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    let key = format!("k{}", i).into_bytes();
                    store.set(&key, &vec![b'x'; VAL_SIZE]).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn engine_get_memtable_hit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = Engine::open(bench_config(dir.path(), usize::MAX)).unwrap();
    for i in 0..N {
        let key = format!("k{:06}", i).into_bytes();
        store.set(&key, &vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_memtable_hit_1k", |b| {
        b.iter(|| {
            for i in 0..N {
                let key = format!("k{:06}", i).into_bytes();
                criterion::black_box(store.get(&key).unwrap());
            }
        });
    });
}

fn engine_get_sstable_hit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    // Threshold sized so most of the data set flushes into tables and reads
    // mostly go through a generation lookup.
    let store = Engine::open(bench_config(dir.path(), 16 * 1024)).unwrap();
    for i in 0..N {
        let key = format!("k{:06}", i).into_bytes();
        store.set(&key, &vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_sstable_hit_1k", |b| {
        b.iter(|| {
            for i in 0..N {
                let key = format!("k{:06}", i).into_bytes();
                criterion::black_box(store.get(&key));
            }
        });
    });
}

fn engine_mixed_workload(c: &mut Criterion) {
    c.bench_function("engine_mixed_set_get_del_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = Engine::open(bench_config(dir.path(), usize::MAX)).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N {
                    let key = format!("k{:06}", i).into_bytes();

                    store.set(&key, &vec![b'x'; VAL_SIZE]).unwrap();
                    criterion::black_box(store.get(&key).unwrap());

                    if i % 5 == 0 {
                        store.del(&key).unwrap();
                    }
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    engine_set_no_flush,
    engine_set_with_flush,
    engine_get_memtable_hit,
    engine_get_sstable_hit,
    engine_mixed_workload,
);

criterion_main!(benches);
