//! Futex: a compare-and-wait primitive on a shared 32-bit word.
//!
//! The building block for [`Semaphore`](super::Semaphore) and
//! [`Mutex`](super::Mutex). `wait` atomically compares the futex's value
//! against an expected value and, on match, suspends the calling task until
//! [`Futex::wake`], [`Futex::wake_cancel`], or [`Futex::destroy`] is called.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use core::task::{Context, Poll, Waker};

use planck_noalloc::vec::ArrayVec;

use super::IrqSpinLock;

/// Maximum number of tasks that may queue on a single futex instance.
///
/// Bounds one futex's own wait list; the system-wide waiter cap used by the
/// keyed lookup table is [`FUTEX_MAX_WAITERS`].
const MAX_WAITERS_PER_FUTEX: usize = 64;

/// System-wide cap on concurrently-blocked futex waiters, across every
/// futex reachable through [`lookup_or_register`].
pub const FUTEX_MAX_WAITERS: usize = 4096;

/// Why a blocked [`Futex::wait`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// A matching [`Futex::wake`] call selected this waiter.
    Wake,
    /// The futex was destroyed while this task was waiting.
    Destroyed,
    /// A pending signal cancelled the wait; the caller must retry or
    /// propagate cancellation per its own semantics.
    Cancel,
}

/// Outcome of [`Futex::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The current value did not match `expected`; the call did not block.
    NotBlocked,
    /// The task blocked and was later woken for `reason`.
    Woken(WakeReason),
}

const REASON_WAKE: u8 = 0;
const REASON_DESTROYED: u8 = 1;
const REASON_CANCEL: u8 = 2;

fn reason_from_code(code: u8) -> WakeReason {
    match code {
        REASON_DESTROYED => WakeReason::Destroyed,
        REASON_CANCEL => WakeReason::Cancel,
        _ => WakeReason::Wake,
    }
}

struct Registration {
    waker: Waker,
    /// Points at the owning [`FutexWaitFuture`]'s `reason` cell. Valid as
    /// long as the registration stays in the queue: a pinned future is only
    /// ever removed from the queue by `wake`/`wake_cancel`/`destroy`
    /// (which run with the queue lock held) before it is dropped.
    reason: *const AtomicU8,
}

// SAFETY: `reason` is only ever written while `waiters` is locked, and the
// pointed-to future outlives its queue entry by construction (see `poll`).
unsafe impl Send for Registration {}

/// A shared 32-bit word plus a liveness flag and wait queue.
pub struct Futex {
    value: AtomicU32,
    alive: AtomicBool,
    waiters: IrqSpinLock<ArrayVec<Registration, MAX_WAITERS_PER_FUTEX>>,
}

impl Futex {
    /// Creates a new, live futex with the given initial value.
    pub const fn new(initial: u32) -> Self {
        Self {
            value: AtomicU32::new(initial),
            alive: AtomicBool::new(true),
            waiters: IrqSpinLock::new(ArrayVec::new()),
        }
    }

    /// Reads the current value.
    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Unconditionally sets the value, without waking anyone.
    pub fn store(&self, value: u32) {
        self.value.store(value, Ordering::Release);
    }

    /// Compare-and-waits: if the current value differs from `expected`,
    /// returns immediately. Otherwise suspends the calling task until woken.
    pub fn wait(&self, expected: u32) -> FutexWaitFuture<'_> {
        FutexWaitFuture {
            futex: self,
            expected,
            registered: false,
            reason: AtomicU8::new(REASON_WAKE),
        }
    }

    /// Wakes up to `count` waiters with [`WakeReason::Wake`].
    ///
    /// Returns the number actually woken; `0` if there were no waiters.
    pub fn wake(&self, count: usize) -> usize {
        self.wake_with_reason(count, REASON_WAKE)
    }

    /// Wakes up to `count` waiters with [`WakeReason::Cancel`], used by the
    /// signal delivery path to interrupt a blocked wait.
    pub fn wake_cancel(&self, count: usize) -> usize {
        self.wake_with_reason(count, REASON_CANCEL)
    }

    /// Marks the futex dead and wakes every waiter with
    /// [`WakeReason::Destroyed`]. Further waits observe [`WaitOutcome::NotBlocked`]-like
    /// behavior is not attempted automatically: callers must stop using a
    /// destroyed futex.
    pub fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
        self.wake_with_reason(MAX_WAITERS_PER_FUTEX, REASON_DESTROYED);
    }

    /// Returns `false` once [`Futex::destroy`] has been called.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn wake_with_reason(&self, count: usize, code: u8) -> usize {
        let mut woken = 0;
        let mut waiters = self.waiters.lock();
        while woken < count {
            if waiters.is_empty() {
                break;
            }
            let registration = waiters.swap_remove(0);
            // SAFETY: see `Registration::reason` invariant.
            unsafe { (*registration.reason).store(code, Ordering::Release) };
            registration.waker.wake();
            woken += 1;
        }
        woken
    }

    fn register(&self, waker: Waker, reason: *const AtomicU8) {
        let mut waiters = self.waiters.lock();
        if waiters.len() < MAX_WAITERS_PER_FUTEX {
            waiters.push(Registration { waker, reason });
        }
    }
}

/// Future returned by [`Futex::wait`].
pub struct FutexWaitFuture<'a> {
    futex: &'a Futex,
    expected: u32,
    registered: bool,
    reason: AtomicU8,
}

impl Future for FutexWaitFuture<'_> {
    type Output = WaitOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.registered {
            if self.futex.value.load(Ordering::Acquire) != self.expected {
                return Poll::Ready(WaitOutcome::NotBlocked);
            }
            self.registered = true;
            let reason_ptr: *const AtomicU8 = &self.reason;
            self.futex.register(cx.waker().clone(), reason_ptr);
            return Poll::Pending;
        }
        let code = self.reason.load(Ordering::Acquire);
        Poll::Ready(WaitOutcome::Woken(reason_from_code(code)))
    }
}

// ---- Keyed lookup table -----------------------------------------------------

const TABLE_SLOTS: usize = 512;
const SLOT_CAPACITY: usize = FUTEX_MAX_WAITERS / TABLE_SLOTS;

struct Slot {
    entries: IrqSpinLock<ArrayVec<(u64, &'static Futex), SLOT_CAPACITY>>,
}

/// Open-addressed table mapping a futex's identity key (its handle's
/// physical address, per `hadron_core::mm::get_phys_addr`) to the
/// [`Futex`] instances backing it.
///
/// Distinct virtual mappings of the same physical word hash to the same
/// slot and therefore observe each other's waiters. Two different keys
/// landing in the same slot (a collision) simply chain within that slot's
/// small list rather than triggering a rehash, at the cost of a short
/// linear scan; this matches the system's documented waiter cap rather
/// than growing unboundedly.
pub struct FutexTable {
    slots: [Slot; TABLE_SLOTS],
}

impl FutexTable {
    const fn new_slot() -> Slot {
        Slot {
            entries: IrqSpinLock::new(ArrayVec::new()),
        }
    }

    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            slots: [const { Self::new_slot() }; TABLE_SLOTS],
        }
    }

    fn slot_for(&self, key: u64) -> &Slot {
        &self.slots[(key as usize) % TABLE_SLOTS]
    }

    /// Finds the futex already registered under `key`, or registers `futex`
    /// under it if none exists yet. Returns `None` if the slot is full.
    pub fn lookup_or_register(&self, key: u64, futex: &'static Futex) -> Option<&'static Futex> {
        let slot = self.slot_for(key);
        let mut entries = slot.entries.lock();
        if let Some((_, existing)) = entries.iter().find(|(k, _)| *k == key) {
            return Some(existing);
        }
        if entries.len() >= SLOT_CAPACITY {
            return None;
        }
        entries.push((key, futex));
        Some(futex)
    }

    /// Finds the futex already registered under `key`, if any, without
    /// registering one. Used by callers that only want to wake a waiter and
    /// have nothing to register if the key is unknown.
    pub fn lookup(&self, key: u64) -> Option<&'static Futex> {
        let slot = self.slot_for(key);
        let entries = slot.entries.lock();
        entries.iter().find(|(k, _)| *k == key).map(|(_, f)| *f)
    }

    /// Removes the entry for `key`, if present.
    pub fn remove(&self, key: u64) {
        let slot = self.slot_for(key);
        let mut entries = slot.entries.lock();
        if let Some(index) = entries.iter().position(|(k, _)| *k == key) {
            entries.swap_remove(index);
        }
    }
}

impl Default for FutexTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::noop_waker;

    #[test]
    fn wait_returns_not_blocked_on_mismatch() {
        let futex = Futex::new(1);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(futex.wait(0));
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(WaitOutcome::NotBlocked) => {}
            other => panic!("expected NotBlocked, got {other:?}"),
        }
    }

    #[test]
    fn wake_resolves_waiter_with_wake_reason() {
        let futex = Futex::new(0);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(futex.wait(0));
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        assert_eq!(futex.wake(1), 1);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(WaitOutcome::Woken(WakeReason::Wake)) => {}
            other => panic!("expected Woken(Wake), got {other:?}"),
        }
    }

    #[test]
    fn wake_with_no_waiters_returns_zero() {
        let futex = Futex::new(0);
        assert_eq!(futex.wake(5), 0);
    }

    #[test]
    fn destroy_wakes_with_destroyed_reason() {
        let futex = Futex::new(0);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(futex.wait(0));
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        futex.destroy();
        assert!(!futex.is_alive());
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(WaitOutcome::Woken(WakeReason::Destroyed)) => {}
            other => panic!("expected Woken(Destroyed), got {other:?}"),
        }
    }

    #[test]
    fn wake_cancel_uses_cancel_reason() {
        let futex = Futex::new(0);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(futex.wait(0));
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        futex.wake_cancel(1);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(WaitOutcome::Woken(WakeReason::Cancel)) => {}
            other => panic!("expected Woken(Cancel), got {other:?}"),
        }
    }

    #[test]
    fn lookup_or_register_dedups_same_key() {
        static A: Futex = Futex::new(0);
        static B: Futex = Futex::new(0);
        static TABLE: FutexTable = FutexTable::new();
        let first = TABLE.lookup_or_register(42, &A).unwrap();
        let second = TABLE.lookup_or_register(42, &B).unwrap();
        assert!(core::ptr::eq(first, second));
        assert!(core::ptr::eq(first, &A));
    }
}
