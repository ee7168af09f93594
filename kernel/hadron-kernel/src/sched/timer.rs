//! MAIN timer tick handler.
//!
//! Called once per tick from the MAIN timer's interrupt handler. Advances
//! the current thread's time slice, wakes SLEEPING threads whose deadline
//! has passed, and requests a reschedule when either runs out.

use alloc::collections::BinaryHeap;
use core::cmp::{Ordering as CmpOrdering, Reverse};
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use core::task::Waker;

use hadron_core::config::DEFAULT_TIME_SLICE_TICKS;
use hadron_core::sync::IrqSpinLock;

use crate::time::ClockSource;

/// MAIN-timer tick rate, in Hz. One tick is 1ms, matching
/// [`crate::time::derived_tick_count`]'s nanosecond-to-tick conversion.
pub const TICK_HZ: u32 = 1000;

const NANOS_PER_TICK: u64 = 1_000_000_000 / TICK_HZ as u64;

struct SleepEntry {
    deadline: u64,
    waker: Waker,
}

impl PartialEq for SleepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for SleepEntry {}

impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline.cmp(&other.deadline)
    }
}

static SLEEP_QUEUE: IrqSpinLock<BinaryHeap<Reverse<SleepEntry>>> =
    IrqSpinLock::new(BinaryHeap::new());

/// Ticks elapsed since the MAIN timer started, incremented by [`tick`].
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Remaining time slice for the thread currently running on each CPU.
static SLICE_REMAINING: AtomicU32 = AtomicU32::new(DEFAULT_TIME_SLICE_TICKS);

/// Returns the current tick count.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Registers `waker` to be woken once `ticks()` reaches `deadline`.
pub fn register_sleep_waker(deadline: u64, waker: Waker) {
    SLEEP_QUEUE
        .lock()
        .push(Reverse(SleepEntry { deadline, waker }));
}

/// Resets the running thread's time slice to the default.
pub fn reset_slice() {
    SLICE_REMAINING.store(DEFAULT_TIME_SLICE_TICKS, Ordering::Relaxed);
}

/// Advances the tick counter, wakes expired sleepers, and decrements the
/// running thread's time slice.
///
/// Returns `true` if the current thread's time slice has been exhausted and
/// the dispatcher should preempt it in favor of the next ready thread at the
/// same priority (round-robin).
pub fn tick() -> bool {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    wake_expired(now);

    let remaining = SLICE_REMAINING.fetch_sub(1, Ordering::Relaxed);
    if remaining <= 1 {
        SLICE_REMAINING.store(DEFAULT_TIME_SLICE_TICKS, Ordering::Relaxed);
        true
    } else {
        false
    }
}

/// The MAIN timer's [`ClockSource`], expressed in nanoseconds derived from
/// [`ticks`]. Registered once, from `boot::kickstart`, against whichever
/// hardware timer actually drives [`irq_handler`].
pub struct MainClock;

impl ClockSource for MainClock {
    fn name(&self) -> &'static str {
        "pit"
    }

    fn now_nanos(&self) -> u64 {
        ticks() * NANOS_PER_TICK
    }

    fn resolution_nanos(&self) -> u64 {
        NANOS_PER_TICK
    }
}

/// The [`MainClock`] singleton, registered as [`crate::time::TimerRole::Main`].
pub static MAIN_CLOCK: MainClock = MainClock;

/// IRQ handler for the MAIN timer interrupt.
///
/// Advances the tick counter via [`tick`] and, if a thread's slice just
/// expired, marks this CPU's dispatcher preemption flag so `sched::run`'s
/// next turn logs it. Acknowledges the interrupt on the legacy PIC (no
/// IOAPIC/LAPIC controller is registered in this kernel).
pub fn irq_handler(_vector: u8, _fault_ip: u64, _error_code: u64) {
    if tick() {
        crate::sched::set_preempt_pending(hadron_core::cpu_local::current_cpu_id());
    }
    // SAFETY: called only from the IRQ0 trampoline, which runs with this
    // CPU's interrupts disabled until `iretq`.
    unsafe { hadron_core::arch::x86_64::pic8259::send_eoi(0) };
}

fn wake_expired(current_tick: u64) {
    let mut queue = SLEEP_QUEUE.lock();
    while let Some(entry) = queue.peek() {
        if entry.0.deadline <= current_tick {
            let entry = queue.pop().expect("peek just confirmed an entry");
            entry.0.waker.wake();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::task::RawWakerVTable;

    use super::*;

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> core::task::RawWaker {
            raw()
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        fn raw() -> core::task::RawWaker {
            core::task::RawWaker::new(core::ptr::null(), &VTABLE)
        }
        // SAFETY: every vtable function is a safe no-op over a null data
        // pointer that is never dereferenced.
        unsafe { Waker::from_raw(raw()) }
    }

    #[test]
    fn wake_expired_only_wakes_past_deadlines() {
        SLEEP_QUEUE.lock().clear();
        register_sleep_waker(5, noop_waker());
        register_sleep_waker(10, noop_waker());
        wake_expired(5);
        assert_eq!(SLEEP_QUEUE.lock().len(), 1);
        wake_expired(10);
        assert!(SLEEP_QUEUE.lock().is_empty());
    }
}
