//! Benchmarks for chunkfeed.
//!
//! Run with:
//!     cargo bench

use std::io::Cursor;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use chunkfeed::{Context, IngestConfig, Ingestor, KB, MB};

/// `size` bytes of `'O'` with an `'X'` every 300 bytes.
fn records(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| if i % 300 == 0 { b'X' } else { b'O' })
        .collect()
}

fn noop_config() -> IngestConfig {
    IngestConfig::default().with_process_fn(|_, chunk| {
        black_box(chunk.len());
    })
}

fn bench_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("workers");
    group.sample_size(10);

    let size = 64 * MB;
    let data = records(size);
    group.throughput(Throughput::Bytes(size as u64));

    // Many workers, pool grown on demand
    group.bench_function("16_workers_no_seed", |b| {
        let ingestor = Ingestor::new(
            noop_config()
                .with_workers(16)
                .with_buffer_size(MB)
                .with_delimiter(b'X'),
        );
        b.iter(|| {
            let report = ingestor.run(&Context::new(), Cursor::new(&data)).unwrap();
            black_box(report.chunks)
        });
    });

    // Few workers, pool fully seeded
    group.bench_function("3_workers_seeded", |b| {
        let ingestor = Ingestor::new(
            noop_config()
                .with_workers(3)
                .with_buffer_seed(3)
                .with_buffer_size(MB)
                .with_delimiter(b'X'),
        );
        b.iter(|| {
            let report = ingestor.run(&Context::new(), Cursor::new(&data)).unwrap();
            black_box(report.chunks)
        });
    });

    group.finish();
}

fn bench_buffer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_size");
    group.sample_size(10);

    let size = 16 * MB;
    let data = records(size);
    group.throughput(Throughput::Bytes(size as u64));

    for buffer_size in [4 * KB, 64 * KB, MB] {
        group.bench_function(format!("delimited_{}kb", buffer_size / KB), |b| {
            let ingestor = Ingestor::new(
                noop_config()
                    .with_workers(4)
                    .with_buffer_seed(4)
                    .with_buffer_size(buffer_size)
                    .with_delimiter(b'X'),
            );
            b.iter(|| ingestor.run(&Context::new(), Cursor::new(&data)).unwrap());
        });

        group.bench_function(format!("fixed_{}kb", buffer_size / KB), |b| {
            let ingestor = Ingestor::new(
                noop_config()
                    .with_workers(4)
                    .with_buffer_seed(4)
                    .with_buffer_size(buffer_size)
                    .with_no_delimiter(true),
            );
            b.iter(|| ingestor.run(&Context::new(), Cursor::new(&data)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_workers, bench_buffer_sizes);
criterion_main!(benches);
