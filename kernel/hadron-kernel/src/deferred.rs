//! Deferred-interrupt executor.
//!
//! IRQ handlers that need to do more than minimal, strictly-bounded work
//! (anything that allocates, takes a non-IRQ lock, or simply takes "too
//! long") call [`interrupt_defer_isr`] to queue the rest of the work instead
//! of doing it inline. A single, dedicated, system-critical-priority
//! consumer thread drains the queue strictly in FIFO order, one entry at a
//! time — deferred work never runs concurrently with itself, so a driver's
//! deferred handler can assume exclusive access to state it shares only
//! with other deferred handlers from the same device.

use alloc::collections::VecDeque;

use hadron_core::sync::{Futex, IrqSpinLock};

use crate::sched::SYSTEM_CRITICAL_PRIORITY;

/// A deferred handler: the argument is whatever the ISR captured (typically
/// a pointer to the device's own state).
pub type DeferredHandler = fn(usize);

struct Entry {
    handler: DeferredHandler,
    argument: usize,
}

static QUEUE: IrqSpinLock<VecDeque<Entry>> = IrqSpinLock::new(VecDeque::new());

/// Gate word: `0` means the queue was empty the last time the consumer
/// checked, `1` means a producer has pushed since. The consumer waits on
/// this rather than busy-polling the queue between batches.
static SIGNAL: Futex = Futex::new(0);

/// Queues `handler(argument)` to run on the deferred-interrupt executor
/// thread. Safe to call from IRQ context: never blocks, never allocates
/// beyond the queue's own growth.
pub fn interrupt_defer_isr(handler: DeferredHandler, argument: usize) {
    QUEUE.lock().push_back(Entry { handler, argument });
    SIGNAL.store(1);
    SIGNAL.wake(1);
}

/// Spawns the dedicated deferred-interrupt executor thread, pinned to
/// `cpu`, at the system-critical priority band.
pub fn spawn_executor(cpu: u32) -> crate::tcb::ThreadId {
    crate::sched::spawn(
        "deferred-irq",
        SYSTEM_CRITICAL_PRIORITY,
        1u64 << cpu,
        true,
        run(),
    )
}

async fn run() {
    loop {
        while let Some(entry) = QUEUE.lock().pop_front() {
            (entry.handler)(entry.argument);
        }
        SIGNAL.store(0);
        // Re-check after resetting the gate: if a producer pushed and set
        // the gate between our drain loop ending and this point, go drain
        // again instead of registering a wait that would never be woken
        // for the work already queued. `Futex::wait` itself closes the
        // remaining window: it rechecks the value against `0` atomically
        // with registering the waker, so a push landing in that last
        // instant still resolves the wait immediately instead of being lost.
        if !QUEUE.lock().is_empty() {
            continue;
        }
        SIGNAL.wait(0).await;
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static SEEN: AtomicUsize = AtomicUsize::new(0);

    fn record(argument: usize) {
        SEEN.store(argument, Ordering::Relaxed);
    }

    #[test]
    fn queued_entry_is_drained_in_order() {
        QUEUE.lock().clear();
        interrupt_defer_isr(record, 7);
        interrupt_defer_isr(record, 9);
        assert_eq!(QUEUE.lock().len(), 2);

        let entry = QUEUE.lock().pop_front().unwrap();
        (entry.handler)(entry.argument);
        assert_eq!(SEEN.load(Ordering::Relaxed), 7);

        let entry = QUEUE.lock().pop_front().unwrap();
        (entry.handler)(entry.argument);
        assert_eq!(SEEN.load(Ordering::Relaxed), 9);
    }
}
