//! The ingestion engine.
//!
//! [`Ingestor`] drives one run end to end:
//!
//! 1. validate the context, source and configuration
//! 2. build a fresh buffer pool, gate and coordinator for this run
//! 3. on the calling thread, read a chunk, wait for a gate slot, dispatch it
//! 4. once the loop stops, drain outstanding chunks and report
//!
//! Cancellation is checked at chunk granularity: before each read and while
//! waiting for a gate slot. A read or delimiter extension that is already in
//! progress is not interrupted, so the loop may read one more chunk after the
//! context is cancelled. That chunk is never dispatched.

use std::io::Read;
use std::thread;

use crate::buffer::{BufferPool, PoolStats};
use crate::config::{IngestConfig, Settings};
use crate::context::Context;
use crate::error::IngestError;
use crate::reader::ChunkReader;

use super::coordinator::{Coordinator, LoopExit};
use super::dispatcher::{Dispatcher, Job};
use super::gate::Gate;

/// Summary of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Chunks handed to the process function.
    pub chunks: u64,
    /// Bytes handed to the process function.
    pub bytes: u64,
    /// Buffer pool counters at the end of the run.
    pub pool: PoolStats,
}

/// Runs ingestions with one configuration.
///
/// An `Ingestor` holds no per-run state; each call builds its own pool, so
/// one `Ingestor` may serve several runs concurrently.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use chunkfeed::{Context, IngestConfig, Ingestor};
///
/// let lines = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&lines);
///
/// let ingestor = Ingestor::new(
///     IngestConfig::default()
///         .with_process_fn(move |_ctx, chunk| {
///             let n = chunk.iter().filter(|&&b| b == b'\n').count();
///             counter.fetch_add(n, Ordering::Relaxed);
///         })
///         .with_workers(4)
///         .with_buffer_size(16),
/// );
///
/// let report = ingestor.run(&Context::new(), Cursor::new("a\nb\nc\n".repeat(100)))?;
/// assert_eq!(lines.load(Ordering::Relaxed), 300);
/// assert_eq!(report.bytes, 600);
/// # Ok::<(), chunkfeed::IngestError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    /// Creates an ingestor. The configuration is validated on each run.
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests `source` until it is exhausted, fails, or `ctx` is cancelled.
    ///
    /// # Errors
    ///
    /// In checking order: [`IngestError::MissingContext`],
    /// [`IngestError::NilSource`], [`IngestError::MissingCallback`],
    /// [`IngestError::MissingBufferSize`]; then, after every dispatched chunk
    /// has been processed, [`IngestError::Source`] or
    /// [`IngestError::Cancelled`].
    pub fn ingest<R: Read>(
        &self,
        ctx: Option<&Context>,
        source: Option<R>,
    ) -> Result<(), IngestError> {
        checked_run(&self.config, ctx, source).map(|_| ())
    }

    /// Same as [`Ingestor::ingest`] with the context and source given, also
    /// returning a [`IngestReport`].
    pub fn run<R: Read>(&self, ctx: &Context, source: R) -> Result<IngestReport, IngestError> {
        let settings = self.config.resolve()?;
        run_with(&settings, ctx, source)
    }
}

/// Ingests `source`, feeding each chunk to the configured process function.
///
/// Same contract as [`Ingestor::ingest`], without building an `Ingestor`.
pub fn ingest<R: Read>(
    config: &IngestConfig,
    ctx: Option<&Context>,
    source: Option<R>,
) -> Result<(), IngestError> {
    checked_run(config, ctx, source).map(|_| ())
}

/// Checks context, source, then configuration, in that order, and runs.
fn checked_run<R: Read>(
    config: &IngestConfig,
    ctx: Option<&Context>,
    source: Option<R>,
) -> Result<IngestReport, IngestError> {
    let ctx = ctx.ok_or(IngestError::MissingContext)?;
    let source = source.ok_or(IngestError::NilSource)?;
    let settings = config.resolve()?;
    run_with(&settings, ctx, source)
}

fn run_with<R: Read>(
    settings: &Settings,
    ctx: &Context,
    source: R,
) -> Result<IngestReport, IngestError> {
    log::debug!("starting ingestion: {:?}", settings);

    let pool = BufferPool::with_seed(settings.buffer_size, settings.buffer_seed);
    let gate = Gate::new(settings.workers);
    let mut reader = ChunkReader::new(source, settings.delimiter, settings.no_delimiter);
    let coordinator = Coordinator::new();

    let result = thread::scope(|scope| {
        let mut dispatcher = Dispatcher::new(scope, settings, ctx, &pool);
        let exit = read_loop(&mut reader, &pool, &gate, &coordinator, &mut dispatcher, ctx);

        log::debug!(
            "read loop stopped ({:?}) after {} chunks, {} workers, {}/{} slots busy",
            exit,
            reader.chunks(),
            dispatcher.spawned(),
            gate.in_use(),
            gate.capacity()
        );
        if matches!(exit, LoopExit::Cancelled) {
            log::warn!("ingestion cancelled after {} bytes", reader.bytes());
        }

        // Closing the queue lets idle workers exit so the scope can join them.
        drop(dispatcher);
        coordinator.finish(exit, ctx)
    });

    let report = IngestReport {
        chunks: reader.chunks(),
        bytes: reader.bytes(),
        pool: pool.stats(),
    };
    log::debug!(
        "ingested {} chunks, {} bytes of {}-byte buffers ({:?})",
        report.chunks,
        report.bytes,
        pool.buffer_size(),
        report.pool
    );

    result.map(|()| report)
}

fn read_loop<'env, R: Read>(
    reader: &mut ChunkReader<R>,
    pool: &BufferPool,
    gate: &'env Gate,
    coordinator: &Coordinator,
    dispatcher: &mut Dispatcher<'_, 'env>,
    ctx: &Context,
) -> LoopExit {
    loop {
        if ctx.is_done() {
            return LoopExit::Cancelled;
        }

        let mut buf = pool.acquire();
        match reader.fill(&mut buf) {
            Ok(true) => {}
            Ok(false) => {
                pool.release(buf);
                return LoopExit::Exhausted;
            }
            Err(e) => {
                pool.release(buf);
                log::debug!("source failed: {}", e);
                return LoopExit::Failed(e);
            }
        }

        let Some(permit) = gate.acquire(ctx) else {
            pool.release(buf);
            return LoopExit::Cancelled;
        };

        let chunk = reader.seal(buf);
        log::trace!("dispatching {}", chunk);
        dispatcher.dispatch(Job::new(chunk, permit, coordinator.track()));
    }
}
