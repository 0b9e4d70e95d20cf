#![no_main]

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use chunkfeed::{Context, IngestConfig, Ingestor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, u8, bool, Vec<u8>)| {
    let (size, delimiter, no_delimiter, data) = input;
    let buffer_size = usize::from(size % 64) + 1;

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&chunks);
    let config = IngestConfig::default()
        .with_process_fn(move |_, chunk| {
            sink.lock().unwrap().push((chunk.sequence(), chunk.data().to_vec()));
        })
        .with_workers(3)
        .with_buffer_size(buffer_size)
        .with_delimiter(delimiter)
        .with_no_delimiter(no_delimiter);

    let report = Ingestor::new(config)
        .run(&Context::new(), Cursor::new(data.clone()))
        .unwrap();

    let mut chunks = chunks.lock().unwrap().clone();
    chunks.sort_by_key(|(sequence, _)| *sequence);
    let chunks: Vec<Vec<u8>> = chunks.into_iter().map(|(_, c)| c).collect();

    // Verify: chunks reproduce the input
    assert_eq!(chunks.len() as u64, report.chunks);
    assert_eq!(chunks.concat(), data);

    // Verify: boundaries
    if let Some((_, rest)) = chunks.split_last() {
        for chunk in rest {
            if no_delimiter {
                assert_eq!(chunk.len(), buffer_size);
            } else {
                assert_eq!(chunk.last(), Some(&delimiter));
            }
        }
    }

    // Verify: every buffer went back to the pool
    assert_eq!(
        report.pool.idle as u64 + report.pool.discarded,
        report.pool.allocated
    );
});
