//! Owner-tracked mutex with optional recursion and priority inheritance.
//!
//! Unlike [`SpinLock`](super::SpinLock), a contended [`Mutex`] parks the
//! waiting task instead of spinning: `lock()` returns a future that waits
//! on an embedded [`Futex`] and yields to the executor, which is how the
//! scheduler suspends a thread on this resource (see the `wait-resource`
//! field of the thread control block). A small side table of waiters still
//! exists, but only to track the priority ceiling for [`MutexFlags::PRIO_ELEVATION`];
//! the futex is the actual wait/wake transport. `unlock` wakes one waiter
//! in FIFO order off the futex's own queue rather than picking the
//! highest-priority one directly — see `unlock`'s doc comment.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use core::task::{Context, Poll};

use planck_noalloc::vec::ArrayVec;

use super::futex::{Futex, FutexWaitFuture};
use super::IrqSpinLock;

/// Maximum number of tasks that may simultaneously queue on one mutex's
/// priority-ceiling table.
const MAX_WAITERS: usize = 32;

/// Opaque thread identifier. Assigned and interpreted entirely by the
/// scheduler; `hadron-core` only ever compares these for equality.
pub type OwnerId = u64;

const NO_OWNER: OwnerId = 0;

bitflags::bitflags! {
    /// Behavioral flags for a [`Mutex`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MutexFlags: u32 {
        /// The owning thread may lock again without deadlocking; each extra
        /// lock increments a refcount that `unlock` must match.
        const RECURSIVE      = 1 << 0;
        /// While held, the owner's dynamic priority is raised to the
        /// highest priority among blocked waiters, and restored on release.
        const PRIO_ELEVATION = 1 << 1;
    }
}

/// Errors returned by [`Mutex`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexError {
    /// The caller does not hold the lock (only the owner may unlock).
    Unauthorized,
    /// The mutex has been destroyed.
    Destroyed,
}

/// Scheduler hook used to implement `PRIO_ELEVATION`.
///
/// `hadron-core` has no scheduler of its own, so priority inheritance is
/// implemented by calling back into whatever the kernel registers here at
/// boot via [`register_priority_agent`], rather than by depending on
/// `hadron-kernel` directly.
pub trait PriorityAgent: Sync {
    /// Sets `owner`'s dynamic priority, returning its previous value.
    fn set_priority(&self, owner: OwnerId, priority: u8) -> u8;
}

static PRIORITY_AGENT: IrqSpinLock<Option<&'static dyn PriorityAgent>> = IrqSpinLock::new(None);

/// Registers the scheduler's priority-inheritance agent.
///
/// Must be called once during boot, before any `PRIO_ELEVATION` mutex sees
/// contention. Mutexes created before registration simply skip elevation.
pub fn register_priority_agent(agent: &'static dyn PriorityAgent) {
    *PRIORITY_AGENT.lock() = Some(agent);
}

/// A waiter's priority-ceiling bookkeeping entry. Carries no waker: waking
/// goes through the mutex's embedded [`Futex`], not this table.
struct Waiter {
    owner: OwnerId,
    priority: u8,
}

/// An owner-tracked mutual exclusion lock.
pub struct Mutex<T> {
    owner: AtomicU64,
    recursion: AtomicU32,
    flags: MutexFlags,
    /// The owning thread's priority before elevation, so it can be restored.
    saved_priority: AtomicU8,
    waiters: IrqSpinLock<ArrayVec<Waiter, MAX_WAITERS>>,
    futex: Futex,
    alive: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by the owner/recursion protocol.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new, unlocked mutex with no special flags.
    pub const fn new(value: T) -> Self {
        Self::with_flags(value, MutexFlags::empty())
    }

    /// Creates a new, unlocked mutex with the given [`MutexFlags`].
    pub const fn with_flags(value: T, flags: MutexFlags) -> Self {
        Self {
            owner: AtomicU64::new(NO_OWNER),
            recursion: AtomicU32::new(0),
            flags,
            saved_priority: AtomicU8::new(0),
            waiters: IrqSpinLock::new(ArrayVec::new()),
            futex: Futex::new(0),
            alive: AtomicBool::new(true),
            data: UnsafeCell::new(value),
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self, owner: OwnerId, priority: u8) -> Option<MutexGuard<'_, T>> {
        self.try_acquire(owner, priority)
    }

    /// Acquires the lock, yielding the calling task while contended.
    ///
    /// `owner` identifies the calling thread and `priority` is its current
    /// dynamic priority, used for `PRIO_ELEVATION` bookkeeping while queued.
    pub fn lock(&self, owner: OwnerId, priority: u8) -> MutexLockFuture<'_, T> {
        MutexLockFuture {
            mutex: self,
            owner,
            priority,
            queued: false,
            wait: None,
        }
    }

    /// Releases the lock. Only the current owner may call this.
    ///
    /// Wakes one waiter off the futex's FIFO queue, not necessarily the
    /// highest-priority one tracked in `waiters`: the priority-ceiling
    /// table only drives inheritance (the current owner's boosted
    /// priority while held), not wake selection. A real-time scheduler
    /// wanting strict highest-priority-first wakeup would need a priority
    /// heap wired directly into the futex wait queue; this mirrors the
    /// common non-PI futex mutex tradeoff (e.g. glibc's default mutex also
    /// wakes with a plain `FUTEX_WAKE 1`).
    pub fn unlock(&self, owner: OwnerId) -> Result<(), MutexError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(MutexError::Destroyed);
        }
        let current = self.owner.load(Ordering::Acquire);
        if current != owner {
            return Err(MutexError::Unauthorized);
        }

        let remaining = self.recursion.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 {
            return Ok(());
        }

        self.restore_priority(owner);
        self.owner.store(NO_OWNER, Ordering::Release);
        self.futex.store(self.futex.load().wrapping_add(1));
        self.futex.wake(1);
        Ok(())
    }

    /// Marks the mutex destroyed and wakes every waiter so they observe
    /// [`MutexError::Destroyed`] on their next poll.
    pub fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
        self.futex.destroy();
    }

    fn try_acquire(&self, owner: OwnerId, priority: u8) -> Option<MutexGuard<'_, T>> {
        if !self.alive.load(Ordering::Acquire) {
            return None;
        }
        match self
            .owner
            .compare_exchange(NO_OWNER, owner, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => {
                self.recursion.store(1, Ordering::Relaxed);
                self.saved_priority.store(priority, Ordering::Relaxed);
                self.remove_waiter(owner);
                Some(MutexGuard { mutex: self, owner })
            }
            Err(current) if current == owner && self.flags.contains(MutexFlags::RECURSIVE) => {
                self.recursion.fetch_add(1, Ordering::AcqRel);
                Some(MutexGuard { mutex: self, owner })
            }
            Err(_) => None,
        }
    }

    fn register_waiter(&self, owner: OwnerId, priority: u8) {
        {
            let mut waiters = self.waiters.lock();
            if !waiters.iter().any(|w| w.owner == owner) && waiters.len() < MAX_WAITERS {
                waiters.push(Waiter { owner, priority });
            }
        }
        self.elevate_owner_if_needed();
    }

    fn remove_waiter(&self, owner: OwnerId) {
        let mut waiters = self.waiters.lock();
        if let Some(idx) = waiters.iter().position(|w| w.owner == owner) {
            waiters.swap_remove(idx);
        }
    }

    fn elevate_owner_if_needed(&self) {
        if !self.flags.contains(MutexFlags::PRIO_ELEVATION) {
            return;
        }
        let owner = self.owner.load(Ordering::Acquire);
        if owner == NO_OWNER {
            return;
        }
        let ceiling = self.waiters.lock().iter().map(|w| w.priority).max();
        let Some(ceiling) = ceiling else { return };
        if let Some(agent) = *PRIORITY_AGENT.lock() {
            agent.set_priority(owner, ceiling);
        }
    }

    fn restore_priority(&self, owner: OwnerId) {
        if !self.flags.contains(MutexFlags::PRIO_ELEVATION) {
            return;
        }
        let base = self.saved_priority.load(Ordering::Relaxed);
        if let Some(agent) = *PRIORITY_AGENT.lock() {
            agent.set_priority(owner, base);
        }
    }
}

/// RAII guard releasing a [`Mutex`] when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    owner: OwnerId,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Returns the underlying [`Mutex`], used by [`Condvar::wait_async`](super::Condvar::wait_async)
    /// to re-acquire after a notification.
    pub fn mutex_ref(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: only the owner holds a guard at a time.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: only the owner holds a guard at a time.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self.mutex.unlock(self.owner);
    }
}

/// Future returned by [`Mutex::lock`].
pub struct MutexLockFuture<'a, T> {
    mutex: &'a Mutex<T>,
    owner: OwnerId,
    priority: u8,
    queued: bool,
    wait: Option<FutexWaitFuture<'a>>,
}

impl<'a, T> Future for MutexLockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            if let Some(wait) = self.wait.as_mut() {
                match Pin::new(wait).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(_) => self.wait = None,
                }
            }

            if let Some(guard) = self.mutex.try_acquire(self.owner, self.priority) {
                return Poll::Ready(guard);
            }

            if !self.queued {
                self.queued = true;
                self.mutex.register_waiter(self.owner, self.priority);
                // Re-check: the owner may have released between the failed
                // try_acquire above and registering as a waiter.
                if let Some(guard) = self.mutex.try_acquire(self.owner, self.priority) {
                    return Poll::Ready(guard);
                }
            }

            let seq = self.mutex.futex.load();
            self.wait = Some(self.mutex.futex.wait(seq));
            match Pin::new(self.wait.as_mut().expect("just assigned")).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(_) => self.wait = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::noop_waker;

    #[test]
    fn try_lock_succeeds_when_free() {
        let mutex = Mutex::new(10);
        let guard = mutex.try_lock(1, 0).unwrap();
        assert_eq!(*guard, 10);
    }

    #[test]
    fn try_lock_fails_for_other_owner() {
        let mutex = Mutex::new(10);
        let _guard = mutex.try_lock(1, 0).unwrap();
        assert!(mutex.try_lock(2, 0).is_none());
    }

    #[test]
    fn recursive_lock_requires_flag() {
        let mutex = Mutex::new(0);
        let _first = mutex.try_lock(1, 0).unwrap();
        assert!(mutex.try_lock(1, 0).is_none());
    }

    #[test]
    fn recursive_lock_allowed_with_flag() {
        let mutex = Mutex::with_flags(0, MutexFlags::RECURSIVE);
        let first = mutex.try_lock(1, 0).unwrap();
        let second = mutex.try_lock(1, 0).unwrap();
        drop(second);
        drop(first);
        assert!(mutex.try_lock(2, 0).is_some());
    }

    #[test]
    fn unlock_by_non_owner_is_rejected() {
        let mutex = Mutex::new(0);
        let _guard = mutex.try_lock(1, 0).unwrap();
        assert_eq!(mutex.unlock(2), Err(MutexError::Unauthorized));
    }

    #[test]
    fn release_wakes_the_first_queued_waiter() {
        // Wake order is FIFO off the futex queue, not priority order: the
        // waiter queued first (lower priority) wins the lock, and the
        // higher-priority one queued second stays pending.
        let mutex = Mutex::new(0);
        let guard = mutex.try_lock(1, 0).unwrap();

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut first = core::pin::pin!(mutex.lock(2, 1));
        assert!(first.as_mut().poll(&mut cx).is_pending());
        let mut second = core::pin::pin!(mutex.lock(3, 9));
        assert!(second.as_mut().poll(&mut cx).is_pending());

        drop(guard);

        match first.as_mut().poll(&mut cx) {
            Poll::Ready(g) => assert_eq!(*g, 0),
            Poll::Pending => panic!("expected the first-queued waiter to acquire the lock"),
        }
        assert!(second.as_mut().poll(&mut cx).is_pending());
    }

    #[test]
    fn elevation_raises_owner_to_waiter_ceiling() {
        struct RecordingAgent {
            last: IrqSpinLock<Option<(OwnerId, u8)>>,
        }
        impl PriorityAgent for RecordingAgent {
            fn set_priority(&self, owner: OwnerId, priority: u8) -> u8 {
                *self.last.lock() = Some((owner, priority));
                0
            }
        }
        static AGENT: RecordingAgent = RecordingAgent {
            last: IrqSpinLock::new(None),
        };
        register_priority_agent(&AGENT);

        let mutex = Mutex::with_flags(0, MutexFlags::PRIO_ELEVATION);
        let _guard = mutex.try_lock(1, 0).unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut blocked = core::pin::pin!(mutex.lock(2, 7));
        assert!(blocked.as_mut().poll(&mut cx).is_pending());

        assert_eq!(*AGENT.last.lock(), Some((1, 7)));
    }

    #[test]
    fn destroy_wakes_all_waiters() {
        let mutex = Mutex::new(0);
        let _guard = mutex.try_lock(1, 0).unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut blocked = core::pin::pin!(mutex.lock(2, 0));
        assert!(blocked.as_mut().poll(&mut cx).is_pending());
        mutex.destroy();
        assert_eq!(mutex.unlock(1), Err(MutexError::Destroyed));
    }
}
