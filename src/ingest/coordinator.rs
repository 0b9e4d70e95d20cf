//! Completion tracking and terminal outcome of a run.
//!
//! Every dispatched chunk carries a [`Tracker`]. The all-done signal is the
//! disconnection of a channel whose senders are the trackers plus one held by
//! the [`Coordinator`] itself; the coordinator drops its own sender only when
//! the read loop has exited, so the signal fires exactly once, after the last
//! outstanding chunk.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};

use crate::context::{CancelReason, Context};
use crate::error::IngestError;

/// Why the read loop stopped.
#[derive(Debug)]
pub(crate) enum LoopExit {
    /// The source reported end-of-stream.
    Exhausted,
    /// Cancellation was observed between chunks or at the gate.
    Cancelled,
    /// The source failed.
    Failed(io::Error),
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    Draining,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Completed => "completed",
            Phase::Cancelled => "cancelled",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks outstanding units of work and decides the run's result.
#[derive(Debug)]
pub(crate) struct Coordinator {
    phase: Phase,
    signal: Sender<()>,
    all_done: Receiver<()>,
    outstanding: Arc<AtomicUsize>,
}

/// Marks one outstanding unit of work until dropped.
#[derive(Debug)]
pub(crate) struct Tracker {
    _signal: Sender<()>,
    outstanding: Arc<AtomicUsize>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (signal, all_done) = bounded(0);
        Self {
            phase: Phase::Running,
            signal,
            all_done,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers a new unit of work.
    pub fn track(&self) -> Tracker {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Tracker {
            _signal: self.signal.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Returns the number of units that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Waits for every tracked unit and produces the run's result.
    ///
    /// Whatever the outcome, this only returns once all trackers are dropped.
    pub fn finish(self, exit: LoopExit, ctx: &Context) -> Result<(), IngestError> {
        let (phase, result) = self.drain(exit, ctx);
        log::debug!("ingestion {}", phase);
        result
    }

    fn drain(mut self, exit: LoopExit, ctx: &Context) -> (Phase, Result<(), IngestError>) {
        self.transition(Phase::Draining);
        let Coordinator {
            signal, all_done, ..
        } = self;
        drop(signal);

        let wait_all = || {
            // Never receives a message: returns on disconnection.
            let _ = all_done.recv();
        };
        let cancelled = || IngestError::Cancelled(ctx.err().unwrap_or(CancelReason::Cancelled));

        match exit {
            LoopExit::Failed(err) => {
                wait_all();
                (Phase::Failed, Err(err.into()))
            }
            LoopExit::Cancelled => {
                wait_all();
                (Phase::Cancelled, Err(cancelled()))
            }
            LoopExit::Exhausted => {
                // Completion wins when both signals are already in.
                if matches!(all_done.try_recv(), Err(TryRecvError::Disconnected)) {
                    return (Phase::Completed, Ok(()));
                }

                select! {
                    recv(all_done) -> _ => (Phase::Completed, Ok(())),
                    recv(ctx.done()) -> _ => {
                        log::warn!("context cancelled while draining");
                        wait_all();
                        (Phase::Cancelled, Err(cancelled()))
                    }
                }
            }
        }
    }

    fn transition(&mut self, to: Phase) {
        log::debug!(
            "{} -> {} ({} outstanding)",
            self.phase,
            to,
            self.outstanding()
        );
        self.phase = to;
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
