//! Cooperative cancellation.
//!
//! A [`Context`] is a cloneable cancellation handle shared between the caller,
//! the ingestion engine, and every processing callback. It is cancelled either
//! explicitly through [`Context::cancel`] or implicitly when its deadline
//! passes. Cancellation is sticky and the first reason wins.
//!
//! Blocking waits select on [`Context::done`], a channel that never carries a
//! message and disconnects the moment the context is cancelled.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chunkfeed::{CancelReason, Context};
//!
//! let ctx = Context::with_timeout(Duration::from_secs(60));
//! assert!(!ctx.is_done());
//!
//! ctx.cancel();
//! assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
//! ```

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;
use thiserror::Error;

/// Why a [`Context`] was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CancelReason {
    /// [`Context::cancel`] was called.
    #[error("context canceled")]
    Cancelled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation handle, optionally bounded by a deadline.
///
/// Clones share the same state: cancelling one cancels all of them.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct State {
    // Dropping the sender disconnects `done`, waking every waiter at once.
    trigger: Option<Sender<()>>,
    reason: Option<CancelReason>,
}

impl Context {
    /// Creates a context that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a context that cancels itself after `timeout`.
    ///
    /// A timeout too large to represent as an [`Instant`] behaves like
    /// [`Context::new`].
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    /// Creates a context that cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (trigger, done) = bounded(0);
        let ctx = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    trigger: Some(trigger),
                    reason: None,
                }),
                done,
                deadline,
            }),
        };

        if let Some(deadline) = deadline {
            if deadline <= Instant::now() {
                ctx.finish(CancelReason::DeadlineExceeded);
            } else {
                spawn_deadline_timer(Arc::downgrade(&ctx.inner), deadline);
            }
        }

        ctx
    }

    /// Cancels the context. Calling it again has no effect.
    pub fn cancel(&self) {
        self.finish(CancelReason::Cancelled);
    }

    fn finish(&self, reason: CancelReason) {
        finish(&self.inner, reason);
    }

    /// Returns the cancellation reason, or `None` while the context is live.
    pub fn err(&self) -> Option<CancelReason> {
        let reason = self.inner.state.lock().reason;
        if reason.is_none() && self.deadline_passed() {
            // The timer thread may not have been scheduled yet.
            self.finish(CancelReason::DeadlineExceeded);
            return self.inner.state.lock().reason;
        }
        reason
    }

    /// Returns true once the context has been cancelled.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Returns the deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a channel that disconnects when the context is cancelled.
    ///
    /// No message is ever sent on it, so a `recv` only returns (with an error)
    /// after cancellation. It is meant for `crossbeam_channel::select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(inner: &Inner, reason: CancelReason) {
    let mut state = inner.state.lock();
    if state.reason.is_none() {
        state.reason = Some(reason);
        state.trigger = None;
        log::debug!("context finished: {}", reason);
    }
}

/// Cancels the context when `deadline` passes.
///
/// The thread only holds a weak reference: if every handle is dropped first,
/// the trigger is dropped with them, `done` disconnects and the thread exits.
fn spawn_deadline_timer(inner: Weak<Inner>, deadline: Instant) {
    let done = match inner.upgrade() {
        Some(inner) => inner.done.clone(),
        None => return,
    };

    thread::spawn(move || {
        let timer = crossbeam_channel::at(deadline);
        select! {
            recv(done) -> _ => {}
            recv(timer) -> _ => {
                if let Some(inner) = inner.upgrade() {
                    finish(&inner, CancelReason::DeadlineExceeded);
                }
            }
        }
    });
}
