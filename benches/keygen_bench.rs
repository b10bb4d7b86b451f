use criterion::{black_box, criterion_group, criterion_main, Criterion};
use distbench::{keygen::{KeyGenerator, KeySpacePartitioner, KeyspaceSnapshot, SharedKeyspace}, utils::AtomicStruct};

fn keyspace(locality_probability: i32, no_contention: bool) -> SharedKeyspace {
    AtomicStruct::new(KeyspaceSnapshot {
        partitioner: KeySpacePartitioner::new(1_000_000, 8, 16).unwrap(),
        locality_probability,
        no_contention,
        value_size: 64,
        bucket_prefix: String::from("bucket"),
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("keygen");

    let mut gen = KeyGenerator::new(3, 5, keyspace(-1, false), 42);
    group.bench_function("random_key uniform", |b| b.iter(|| black_box(gen.random_key())));

    let mut gen = KeyGenerator::new(3, 5, keyspace(80, false), 42);
    group.bench_function("random_key locality", |b| b.iter(|| black_box(gen.random_key())));

    let mut gen = KeyGenerator::new(3, 5, keyspace(-1, true), 42);
    group.bench_function("random_key no_contention", |b| b.iter(|| black_box(gen.random_key())));

    for n in [4, 16, 64] {
        let mut gen = KeyGenerator::new(0, 0, keyspace(-1, false), 7);
        group.bench_function(format!("unique_random_keys {}", n), |b| b.iter(|| black_box(gen.unique_random_keys(n))));
    }

    let mut gen = KeyGenerator::new(1, 1, keyspace(-1, false), 7);
    group.bench_function("random_value 64", |b| b.iter(|| black_box(gen.random_value())));

    let partitioner = KeySpacePartitioner::new(1_000_003, 7, 13).unwrap();
    let mut i = 0u64;
    group.bench_function("locate", |b| b.iter(|| {
        i = (i + 7919) % partitioner.num_keys();
        black_box(partitioner.locate(i))
    }));

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
