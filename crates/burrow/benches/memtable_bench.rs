use burrow::{Memtable, MemtableConfig, SkipList};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

const N: i64 = 10_000;

fn skiplist_set_sequential(c: &mut Criterion) {
    c.bench_function("skiplist_set_10k_sequential", |b| {
        b.iter(|| {
            let mut list = SkipList::new();
            for i in 0..N {
                list.set(i, i);
            }
            list
        });
    });
}

fn skiplist_get_hit(c: &mut Criterion) {
    let mut list = SkipList::new();
    for i in 0..N {
        list.set(i, i);
    }

    c.bench_function("skiplist_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N {
                black_box(list.get(&i));
            }
        });
    });
}

fn memtable_set(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table: Memtable<i64, String> = Memtable::open(
        "bench",
        MemtableConfig::new()
            .with_data_dir(dir.path())
            .without_auto_compaction(),
    )
    .unwrap();

    let mut key = 0i64;
    c.bench_function("memtable_set", |b| {
        b.iter(|| {
            key += 1;
            table.set(key, "x".repeat(100)).unwrap();
        });
    });
}

fn memtable_get_hit(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table: Memtable<i64, String> = Memtable::open(
        "bench",
        MemtableConfig::new()
            .with_data_dir(dir.path())
            .without_auto_compaction(),
    )
    .unwrap();
    for i in 0..N {
        table.set(i, "x".repeat(100)).unwrap();
    }

    c.bench_function("memtable_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N {
                black_box(table.get(&i));
            }
        });
    });
}

criterion_group!(
    benches,
    skiplist_set_sequential,
    skiplist_get_hit,
    memtable_set,
    memtable_get_hit
);
criterion_main!(benches);
