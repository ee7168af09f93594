//! Thread control block.
//!
//! A [`Tcb`] is the kernel's unit of scheduling.

use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use hadron_core::config::THREAD_MAX_SIGNALS;
use hadron_core::sync::{Futex, IrqSpinLock};

/// A thread's body: a boxed, pinned, dynamically-dispatched future.
///
/// Kernel threads run cooperatively under the dispatcher: a thread "blocks"
/// by its future returning `Pending` and registering a waker with whatever
/// it is waiting on (a futex, a sleep deadline, a join target), exactly as
/// `hadron_core::sync`'s primitives already do. There is no per-thread
/// kernel stack and no context switch: the dispatcher drives every thread's
/// body from its own stack by calling `poll`, so a thread only "runs" for
/// the duration of one `poll` call. See `crate::arch::x86_64::vcpu` for the
/// architectural save area this scheme deliberately leaves unused.
pub type ThreadBody = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Globally unique thread identifier. Never reused while the kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

/// Termination cause recorded when a thread exits, returned to `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// The thread returned normally from its entry point.
    Normal,
    /// The thread called `exit` explicitly.
    Requested,
    /// The thread was terminated by a fatal signal.
    Signal(u8),
}

/// What a thread is doing right now.
///
/// State transitions: READY <-> RUNNING via the dispatcher; RUNNING ->
/// SLEEPING on a timed wait; RUNNING -> WAITING on blocking synchronization;
/// SLEEPING/WAITING -> READY on wake; RUNNING -> ZOMBIE on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible to run, sitting in a per-CPU ready queue.
    Ready,
    /// Currently executing on some CPU.
    Running,
    /// Blocked until a wake-up deadline passes.
    Sleeping,
    /// Blocked on a synchronization primitive's wait queue.
    Waiting,
    /// Exited; waiting for a joiner to collect its result.
    Zombie,
}

/// A thread's pending-signal bitmask and per-signal handler table.
///
/// Indexed by signal number, 0..`THREAD_MAX_SIGNALS`. Handler `None` means
/// "use the default disposition" (see `crate::signal`).
pub struct SignalState {
    pending: AtomicU32,
    handlers: IrqSpinLock<[Option<usize>; THREAD_MAX_SIGNALS]>,
}

impl SignalState {
    const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            handlers: IrqSpinLock::new([None; THREAD_MAX_SIGNALS]),
        }
    }

    /// Sets the pending bit for `sig`. Returns `true` if it was not already set.
    pub fn raise(&self, sig: u8) -> bool {
        let bit = 1u32 << (sig as u32 % THREAD_MAX_SIGNALS as u32);
        self.pending.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Returns the lowest-numbered pending signal and clears its bit, if any.
    pub fn take_lowest_pending(&self) -> Option<u8> {
        loop {
            let mask = self.pending.load(Ordering::Acquire);
            if mask == 0 {
                return None;
            }
            let sig = mask.trailing_zeros() as u8;
            let bit = 1u32 << sig as u32;
            if self
                .pending
                .compare_exchange_weak(mask, mask & !bit, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(sig);
            }
        }
    }

    /// Installs a handler for `sig`. `None` restores the default disposition.
    ///
    /// `handler` must be the address of an `extern "C" fn(u8)`; `crate::signal`
    /// calls it with that signature when the signal is delivered.
    pub fn set_handler(&self, sig: u8, handler: Option<usize>) {
        self.handlers.lock()[sig as usize % THREAD_MAX_SIGNALS] = handler;
    }

    /// Returns the handler installed for `sig`, if any.
    pub fn handler(&self, sig: u8) -> Option<usize> {
        self.handlers.lock()[sig as usize % THREAD_MAX_SIGNALS]
    }
}

/// What a WAITING thread is blocked on, for cancellation and diagnostics.
///
/// A joining thread is recorded the same way as any other blocker: `join`
/// waits on the target's own `join_futex`, registered in the scheduler's
/// futex table under its physical address, so [`crate::signal::raise`]'s
/// cancellation path needs only this one case to reach every blocking
/// primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResource {
    /// Not currently blocked.
    None,
    /// Blocked on the futex at this key (physical address).
    Futex(u64),
}

/// Snapshot of the error context at the most recent exception, used by the
/// default exception handlers to tag a thread before raising its signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorContext {
    /// Faulting instruction pointer.
    pub fault_ip: u64,
    /// Architecture-specific error/status code (0 if the vector has none).
    pub error_code: u64,
    /// Exception vector that produced this context.
    pub vector: u8,
}

/// The thread control block.
#[repr(C)]
pub struct Tcb {
    /// Stable identifier, assigned once at creation.
    pub id: ThreadId,
    /// Human-readable name for diagnostics.
    pub name: &'static str,

    /// Current scheduling state.
    pub state: IrqSpinLock<ThreadState>,
    /// Dynamic priority (mutated by priority inheritance); 0 = idle.
    pub priority: AtomicU8,
    /// Priority this thread runs at absent any inheritance boost.
    pub base_priority: AtomicU8,
    /// Bitmask of CPUs this thread may run on.
    pub affinity: AtomicU64,
    /// CPU this thread is currently assigned to / running on.
    pub cpu: AtomicU32,

    /// Tick at which a SLEEPING thread should be woken. Unused otherwise.
    pub wake_deadline: AtomicU64,
    /// What this thread is blocked on while WAITING.
    pub wait_resource: IrqSpinLock<WaitResource>,

    /// The thread that created this one, if any.
    pub parent: Option<ThreadId>,
    /// Thread currently joining this one, if any.
    pub joiner: IrqSpinLock<Option<ThreadId>>,
    /// Exit cause, valid once the thread is ZOMBIE.
    pub exit_cause: IrqSpinLock<Option<ExitCause>>,

    /// Pending signals and handler table.
    pub signals: SignalState,

    /// Serializes access to fields above that are not independently atomic.
    pub lock: IrqSpinLock<()>,

    /// Most recent exception context, for signal delivery.
    pub error_context: IrqSpinLock<ErrorContext>,

    /// Set once and never cleared: true for the idle thread and the
    /// system-critical daemons (syslog, deferred-IRQ executor), which run
    /// in a distinct highest-priority band outside normal election.
    pub is_system_critical: AtomicBool,

    /// The thread's runnable body. Taken out by the executor before polling
    /// and put back afterward so a poll never runs while holding this lock.
    /// `None` only while a poll is in flight or after the thread has exited.
    pub body: IrqSpinLock<Option<ThreadBody>>,

    /// Posted to 1 and woken when this thread becomes ZOMBIE; `join` waits
    /// on it rather than busy-polling `state`.
    pub join_futex: Futex,

    /// Bumped every time this thread begins a new wait attempt (a futex
    /// wait, a join, a timed sleep). A wait loop that captures this value
    /// before blocking and compares it after resuming can tell a wake that
    /// belongs to its own attempt apart from a stale wake left over from an
    /// attempt it already abandoned (e.g. a signal-driven `CANCEL` that
    /// arrives just as the normal wake also fires).
    pub generation: AtomicU64,
}

impl Tcb {
    /// Builds a new TCB with the given identity, body and scheduling
    /// parameters. The thread starts in the READY state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ThreadId,
        name: &'static str,
        base_priority: u8,
        affinity: u64,
        parent: Option<ThreadId>,
        body: ThreadBody,
    ) -> Self {
        Self {
            id,
            name,
            state: IrqSpinLock::new(ThreadState::Ready),
            priority: AtomicU8::new(base_priority),
            base_priority: AtomicU8::new(base_priority),
            affinity: AtomicU64::new(affinity),
            cpu: AtomicU32::new(0),
            wake_deadline: AtomicU64::new(0),
            wait_resource: IrqSpinLock::new(WaitResource::None),
            parent,
            joiner: IrqSpinLock::new(None),
            exit_cause: IrqSpinLock::new(None),
            signals: SignalState::new(),
            lock: IrqSpinLock::new(()),
            error_context: IrqSpinLock::new(ErrorContext::default()),
            is_system_critical: AtomicBool::new(false),
            body: IrqSpinLock::new(Some(body)),
            join_futex: Futex::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Starts a new wait attempt, returning its generation number.
    pub fn begin_wait(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns `true` if `generation` is still this thread's current wait
    /// attempt, i.e. no newer attempt has started since it was captured.
    pub fn is_current_wait(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Returns the thread's current dynamic priority.
    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Sets the thread's dynamic priority (used by priority inheritance).
    pub fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    /// Restores the thread's dynamic priority to its unboosted base.
    pub fn restore_base_priority(&self) {
        let base = self.base_priority.load(Ordering::Relaxed);
        self.priority.store(base, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_raise_sets_and_take_clears_lowest_bit() {
        let signals = SignalState::new();
        assert!(signals.raise(5));
        assert!(signals.raise(2));
        // Raising an already-pending signal reports no change.
        assert!(!signals.raise(2));
        assert_eq!(signals.take_lowest_pending(), Some(2));
        assert_eq!(signals.take_lowest_pending(), Some(5));
        assert_eq!(signals.take_lowest_pending(), None);
    }

    #[test]
    fn signal_handler_round_trips() {
        let signals = SignalState::new();
        assert_eq!(signals.handler(3), None);
        signals.set_handler(3, Some(0xdead_beef));
        assert_eq!(signals.handler(3), Some(0xdead_beef));
        signals.set_handler(3, None);
        assert_eq!(signals.handler(3), None);
    }

    #[test]
    fn wait_generation_advances_and_is_detectable() {
        let tcb = Tcb::new(ThreadId(2), "test", 5, 1, None, Box::pin(async {}));
        let first = tcb.begin_wait();
        assert!(tcb.is_current_wait(first));
        let second = tcb.begin_wait();
        assert_ne!(first, second);
        assert!(!tcb.is_current_wait(first));
        assert!(tcb.is_current_wait(second));
    }

    #[test]
    fn priority_boost_and_restore() {
        let tcb = Tcb::new(ThreadId(1), "test", 10, 1, None, Box::pin(async {}));
        assert_eq!(tcb.priority(), 10);
        tcb.set_priority(63);
        assert_eq!(tcb.priority(), 63);
        tcb.restore_base_priority();
        assert_eq!(tcb.priority(), 10);
    }
}
