//! Hands filled chunks to scoped worker threads.
//!
//! Workers are spawned lazily, one per dispatch that finds nobody idle, up to
//! the configured worker count. Each job owns its chunk, its gate permit and
//! its completion tracker, and releases them in that order once the callback
//! has returned.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::Scope;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::buffer::BufferPool;
use crate::chunk::Chunk;
use crate::config::Settings;
use crate::context::Context;

use super::coordinator::Tracker;
use super::gate::Permit;

/// One unit of work: a chunk plus the resources it holds while processed.
#[derive(Debug)]
pub(crate) struct Job<'g> {
    chunk: Chunk,
    permit: Permit<'g>,
    tracker: Tracker,
}

impl<'g> Job<'g> {
    pub fn new(chunk: Chunk, permit: Permit<'g>, tracker: Tracker) -> Self {
        Self {
            chunk,
            permit,
            tracker,
        }
    }

    fn run(self, settings: &Settings, ctx: &Context, pool: &BufferPool) {
        let Job {
            mut chunk,
            permit,
            tracker,
        } = self;
        let sequence = chunk.sequence();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (settings.process_fn)(ctx, &mut chunk);
        }));
        if outcome.is_err() {
            log::error!("process function panicked on chunk #{}", sequence);
        }

        pool.release(chunk.into_buffer());
        drop(permit);
        drop(tracker);
        log::trace!("chunk #{} done", sequence);
    }
}

/// Feeds jobs to at most `settings.workers` threads inside a thread scope.
pub(crate) struct Dispatcher<'scope, 'env> {
    scope: &'scope Scope<'scope, 'env>,
    settings: &'env Settings,
    ctx: &'env Context,
    pool: &'env BufferPool,
    jobs: Sender<Job<'env>>,
    queue: Receiver<Job<'env>>,
    // Bumped after every job, even when the worker goes straight on to the
    // next one, so it overestimates idle workers. It only decides whether to
    // spawn; the gate is what bounds concurrency.
    idle: Arc<AtomicUsize>,
    spawned: usize,
}

impl<'scope, 'env> Dispatcher<'scope, 'env> {
    pub fn new(
        scope: &'scope Scope<'scope, 'env>,
        settings: &'env Settings,
        ctx: &'env Context,
        pool: &'env BufferPool,
    ) -> Self {
        // The gate bounds how many jobs can be queued here.
        let (jobs, queue) = unbounded();
        Self {
            scope,
            settings,
            ctx,
            pool,
            jobs,
            queue,
            idle: Arc::new(AtomicUsize::new(0)),
            spawned: 0,
        }
    }

    /// Queues a job, starting a new worker if none is idle.
    pub fn dispatch(&mut self, job: Job<'env>) {
        if !self.claim_idle() && self.spawned < self.settings.workers {
            self.spawn_worker();
        }

        if let Err(err) = self.jobs.send(job) {
            // Unreachable while `queue` is alive; dropping the job still
            // releases its permit and tracker.
            log::error!("worker queue closed, dropping {}", err.into_inner().chunk);
        }
    }

    /// Returns the number of worker threads started so far.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn spawn_worker(&mut self) {
        let id = self.spawned;
        let queue = self.queue.clone();
        let idle = Arc::clone(&self.idle);
        let (settings, ctx, pool) = (self.settings, self.ctx, self.pool);

        self.scope.spawn(move || {
            log::trace!("worker {} started", id);
            for job in queue.iter() {
                job.run(settings, ctx, pool);
                idle.fetch_add(1, Ordering::AcqRel);
            }
            log::trace!("worker {} stopped", id);
        });

        self.spawned += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::coordinator::{Coordinator, LoopExit};
    use crate::ingest::gate::Gate;
    use std::sync::Mutex;
    use std::thread;

    fn settings(
        workers: usize,
        process_fn: impl Fn(&Context, &mut Chunk) + Send + Sync + 'static,
    ) -> Settings {
        IngestConfig::default()
            .with_process_fn(process_fn)
            .with_workers(workers)
            .with_buffer_size(4)
            .resolve()
            .unwrap()
    }

    fn chunk(sequence: u64, pool: &BufferPool) -> Chunk {
        Chunk::from_buffer(pool.acquire(), sequence, sequence * 4)
    }

    #[test]
    fn test_runs_every_job_and_releases_resources() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let settings = settings(3, move |_, chunk| sink.lock().unwrap().push(chunk.sequence()));
        let ctx = Context::new();
        let pool = BufferPool::new(4);
        let gate = Gate::new(settings.workers);
        let coordinator = Coordinator::new();

        let result = thread::scope(|s| {
            let mut dispatcher = Dispatcher::new(s, &settings, &ctx, &pool);
            for i in 0..10 {
                let permit = gate.acquire(&ctx).unwrap();
                dispatcher.dispatch(Job::new(chunk(i, &pool), permit, coordinator.track()));
            }
            assert!(dispatcher.spawned() <= 3);
            drop(dispatcher);
            coordinator.finish(LoopExit::Exhausted, &ctx)
        });

        assert!(result.is_ok());
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(gate.in_use(), 0);
        assert_eq!(pool.stats().idle as u64, pool.stats().allocated);
    }

    #[test]
    fn test_panicking_callback_still_releases() {
        let settings = settings(2, |_, chunk| {
            if chunk.sequence() == 1 {
                panic!("bad chunk");
            }
        });
        let ctx = Context::new();
        let pool = BufferPool::new(4);
        let gate = Gate::new(settings.workers);
        let coordinator = Coordinator::new();

        let result = thread::scope(|s| {
            let mut dispatcher = Dispatcher::new(s, &settings, &ctx, &pool);
            for i in 0..4 {
                let permit = gate.acquire(&ctx).unwrap();
                dispatcher.dispatch(Job::new(chunk(i, &pool), permit, coordinator.track()));
            }
            drop(dispatcher);
            coordinator.finish(LoopExit::Exhausted, &ctx)
        });

        assert!(result.is_ok());
        assert_eq!(gate.in_use(), 0);
        assert_eq!(pool.stats().idle as u64, pool.stats().allocated);
    }
}
