//! Line counting example.
//!
//! Run with:
//!     cargo run --example line_count -- /path/to/file [workers] [timeout_secs]
//!
//! Reads stdin when no path (or `-`) is given.

use std::env;
use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chunkfeed::{Context, IngestConfig, IngestError, Ingestor, MB};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "-".to_string());
    let workers: usize = args.next().map(|w| w.parse()).transpose()?.unwrap_or(4);
    let timeout = args
        .next()
        .map(|t| t.parse().map(Duration::from_secs))
        .transpose()?;

    let source: Box<dyn Read + Send> = if path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&path)?)
    };

    let lines = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&lines);

    let config = IngestConfig::default()
        .with_process_fn(move |_ctx, chunk| {
            let n = chunk.iter().filter(|&&b| b == b'\n').count();
            counter.fetch_add(n as u64, Ordering::Relaxed);
        })
        .with_workers(workers)
        .with_buffer_seed(workers)
        .with_buffer_size(MB);

    let ctx = match timeout {
        Some(timeout) => Context::with_timeout(timeout),
        None => Context::new(),
    };

    println!("Counting lines in {} with {} workers\n", path, workers);

    let start = Instant::now();
    let report = match Ingestor::new(config).run(&ctx, source) {
        Ok(report) => report,
        Err(IngestError::Cancelled(reason)) => {
            println!(
                "Stopped early ({}): {} lines so far",
                reason,
                lines.load(Ordering::Relaxed)
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let elapsed = start.elapsed();

    println!("Lines:  {}", lines.load(Ordering::Relaxed));
    println!("Chunks: {}", report.chunks);
    println!("Bytes:  {}", report.bytes);
    println!(
        "Pool:   {} allocated, {} reused, {} discarded",
        report.pool.allocated, report.pool.reused, report.pool.discarded
    );
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "Rate:   {:.1} MiB/s",
            report.bytes as f64 / MB as f64 / elapsed.as_secs_f64()
        );
    }

    Ok(())
}
