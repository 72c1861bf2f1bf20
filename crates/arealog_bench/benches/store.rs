//! Append and iteration throughput of the record store.

use arealog_bench::ram_store;
use arealog_core::StoreError;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

const PAYLOAD: [u8; 64] = [0xA5; 64];

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));

    group.bench_function("64b_ram", |b| {
        let store = ram_store(64 * 1024, 8);
        b.iter(|| match store.write(&PAYLOAD) {
            Ok(()) => {}
            Err(StoreError::NoSpace) => store.advance().unwrap(),
            Err(err) => panic!("append failed: {err}"),
        });
    });

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let store = ram_store(64 * 1024, 8);
    while store.write(&PAYLOAD).is_ok() {}

    let mut group = c.benchmark_group("iterate");
    group.bench_function("full_sector", |b| {
        b.iter(|| {
            let mut records = 0usize;
            for record in store.records().unwrap() {
                record.unwrap();
                records += 1;
            }
            records
        });
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_iterate);
criterion_main!(benches);
