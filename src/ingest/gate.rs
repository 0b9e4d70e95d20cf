//! Bounded admission for concurrent chunk processing.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;

use crate::context::Context;

/// A counting semaphore whose memory does not depend on its capacity.
///
/// The count lives behind a mutex. Blocked acquirers wait on a one-slot
/// wakeup channel alongside the context's done channel, so a release and a
/// cancellation both wake them.
#[derive(Debug)]
pub(crate) struct Gate {
    in_use: Mutex<usize>,
    capacity: usize,
    // At most one pending wakeup; a full channel already guarantees one.
    wake: Sender<()>,
    woken: Receiver<()>,
}

/// One occupied gate slot. Dropping it frees the slot.
#[derive(Debug)]
pub(crate) struct Permit<'g> {
    gate: &'g Gate,
}

impl Gate {
    /// Creates a gate admitting at most `capacity` holders at once.
    pub fn new(capacity: usize) -> Self {
        let (wake, woken) = bounded(1);
        Self {
            in_use: Mutex::new(0),
            capacity: capacity.max(1),
            wake,
            woken,
        }
    }

    /// Blocks until a slot is free or `ctx` is cancelled.
    ///
    /// Returns `None` on cancellation, including when the context was already
    /// cancelled and a slot happened to be free.
    pub fn acquire(&self, ctx: &Context) -> Option<Permit<'_>> {
        loop {
            if ctx.is_done() {
                return None;
            }

            if self.try_take() {
                return Some(Permit { gate: self });
            }

            select! {
                recv(self.woken) -> _ => {}
                recv(ctx.done()) -> _ => return None,
            }
        }
    }

    fn try_take(&self) -> bool {
        let mut in_use = self.in_use.lock();
        if *in_use >= self.capacity {
            return false;
        }
        *in_use += 1;
        if *in_use < self.capacity {
            // Pass the wakeup on to any other waiter.
            let _ = self.wake.try_send(());
        }
        true
    }

    fn give_back(&self) {
        *self.in_use.lock() -= 1;
        let _ = self.wake.try_send(());
    }

    /// Returns the number of occupied slots.
    pub fn in_use(&self) -> usize {
        *self.in_use.lock()
    }

    /// Returns the maximum number of simultaneous holders.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.give_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(Gate::new(0).capacity(), 1);
    }

    #[test]
    fn test_huge_capacity_is_cheap() {
        let ctx = Context::new();
        let gate = Gate::new(usize::MAX);
        assert_eq!(gate.capacity(), usize::MAX);

        let permits: Vec<_> = (0..100).map(|_| gate.acquire(&ctx).unwrap()).collect();
        assert_eq!(gate.in_use(), 100);
        drop(permits);
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn test_permits_occupy_slots() {
        let ctx = Context::new();
        let gate = Gate::new(2);

        let a = gate.acquire(&ctx).unwrap();
        let b = gate.acquire(&ctx).unwrap();
        assert_eq!(gate.in_use(), 2);

        drop(a);
        assert_eq!(gate.in_use(), 1);
        drop(b);
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn test_cancelled_context_is_refused() {
        let ctx = Context::new();
        ctx.cancel();
        let gate = Gate::new(4);
        assert!(gate.acquire(&ctx).is_none());
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn test_full_gate_blocks_until_release() {
        let ctx = Context::new();
        let gate = Gate::new(1);
        let held = gate.acquire(&ctx).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| gate.acquire(&ctx).is_some());
            thread::sleep(Duration::from_millis(20));
            assert!(!waiter.is_finished());
            drop(held);
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn test_full_gate_wakes_on_cancel() {
        let ctx = Context::new();
        let gate = Gate::new(1);
        let _held = gate.acquire(&ctx).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| gate.acquire(&ctx).is_none());
            thread::sleep(Duration::from_millis(20));
            ctx.cancel();
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn test_contended_gate_never_overfills() {
        let ctx = Context::new();
        let gate = Gate::new(3);
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let _permit = gate.acquire(&ctx).unwrap();
                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        live.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.in_use(), 0);
    }
}
