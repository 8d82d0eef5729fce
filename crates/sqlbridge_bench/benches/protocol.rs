//! Worker message and round-trip benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sqlbridge_bench::{random_data, random_text};
use sqlbridge_core::{ResultGroup, Value};
use sqlbridge_worker::{Request, Response, Worker, WorkerConfig};

fn result_group(rows: usize) -> ResultGroup {
    ResultGroup {
        columns: vec!["id".into(), "name".into(), "payload".into()],
        values: (0..rows)
            .map(|i| {
                vec![
                    Value::from(i as i64),
                    Value::from(random_text(16)),
                    Value::from(random_data(64)),
                ]
            })
            .collect(),
    }
}

/// Benchmark CBOR encoding and decoding of `exec` results.
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_codec");

    for rows in [1, 100, 1000].iter() {
        let response = Response::results(1, vec![result_group(*rows)]);
        let bytes = response.encode().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", rows), rows, |b, _| {
            b.iter(|| black_box(response.encode().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", rows), rows, |b, _| {
            b.iter(|| black_box(Response::decode(&bytes).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark a request through the worker thread and back.
fn bench_worker_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let worker = Worker::spawn(WorkerConfig::default()).unwrap();
    let mut id = 0u64;

    c.bench_function("worker_round_trip", |b| {
        b.iter(|| {
            id += 1;
            let responses = rt
                .block_on(worker.request(Request::exec(id, "SELECT 1")))
                .unwrap();
            black_box(responses);
        });
    });

    worker.shutdown().unwrap();
}

criterion_group!(benches, bench_codec, bench_worker_round_trip);
criterion_main!(benches);
