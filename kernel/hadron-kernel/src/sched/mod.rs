//! Kernel thread scheduler.
//!
//! Threads are cooperative tasks: a [`crate::tcb::Tcb`] owns a boxed,
//! pinned future as its body, and each CPU runs its own dispatcher that
//! polls the highest-priority ready thread to completion of its current
//! `poll` call. "Blocking" is a thread's body returning `Poll::Pending`
//! after registering a waker with whatever it is waiting on — a futex, a
//! sleep deadline, a join target — exactly the model `hadron_core::sync`'s
//! primitives already implement. There is no separate stack switch for the
//! common case; [`crate::arch::VCpuState`] is reserved for real interrupt
//! entry and future ring-3 process support.
//!
//! Ready threads are kept in `NUM_PRIORITIES` per-CPU FIFO bands (priority 0
//! is idle, the top band is reserved for system-critical daemons). Within a
//! band, ties break FIFO: a thread that is still READY after its time slice
//! (or after a `Poll::Pending` that does not change its state) is
//! re-inserted at the back of its own band, giving round-robin among peers.
//! Placement is affinity-based and fixed at spawn time; this scheduler does
//! not steal work across CPUs.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::task::{Context, Poll};

use hadron_core::config::{MAX_CPUS, NUM_PRIORITIES};
use hadron_core::cpu_local::CpuLocal;
use hadron_core::sync::{Futex, FutexTable, IrqSpinLock, WaitOutcome, WakeReason};

use crate::tcb::{ExitCause, Tcb, ThreadBody, ThreadId, ThreadState, WaitResource};

pub mod timer;
pub mod waker;

/// Dynamic priority of the idle thread. Always exists, always runnable,
/// elected only when every other band is empty ("last resort").
pub const IDLE_PRIORITY: u8 = 0;

/// Dynamic priority reserved for system-critical daemons (deferred-IRQ
/// executor, syslog drain): a distinct band above ordinary work.
pub const SYSTEM_CRITICAL_PRIORITY: u8 = (NUM_PRIORITIES - 1) as u8;

/// Sentinel stored in a CPU's "current thread" slot when nothing is running.
const NO_THREAD: u64 = u64::MAX;

struct ReadyQueues {
    queues: [VecDeque<ThreadId>; NUM_PRIORITIES],
}

impl ReadyQueues {
    const fn new() -> Self {
        Self {
            queues: [const { VecDeque::new() }; NUM_PRIORITIES],
        }
    }

    fn push(&mut self, priority: u8, id: ThreadId) {
        self.queues[priority as usize % NUM_PRIORITIES].push_back(id);
    }

    fn pop(&mut self) -> Option<ThreadId> {
        for band in self.queues.iter_mut().rev() {
            if let Some(id) = band.pop_front() {
                return Some(id);
            }
        }
        None
    }
}

static READY: CpuLocal<IrqSpinLock<ReadyQueues>> =
    CpuLocal::new([const { IrqSpinLock::new(ReadyQueues::new()) }; MAX_CPUS]);

static CURRENT: CpuLocal<AtomicU64> = CpuLocal::new([const { AtomicU64::new(NO_THREAD) }; MAX_CPUS]);

/// Set by the MAIN-timer interrupt handler when [`timer::tick`] reports a
/// running thread's slice expired; cleared at the top of each [`run`] turn.
static PREEMPT_PENDING: CpuLocal<AtomicBool> =
    CpuLocal::new([const { AtomicBool::new(false) }; MAX_CPUS]);

static THREADS: IrqSpinLock<BTreeMap<ThreadId, &'static Tcb>> = IrqSpinLock::new(BTreeMap::new());

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// System-wide futex lookup table backing blocking synchronization
/// primitives (mutex, semaphore, condvar) keyed by resource address.
static FUTEX_TABLE: FutexTable = FutexTable::new();

/// Returns the system-wide futex table.
pub fn futex_table() -> &'static FutexTable {
    &FUTEX_TABLE
}

/// Derives a [`FutexTable`] key for `futex`: its physical address, so
/// distinct virtual mappings of the same underlying word still collide on
/// the same slot. Falls back to the futex's virtual address if it is not
/// (yet) mapped through the VMM, which only costs an extra, harmless
/// collision rather than a lookup failure.
fn futex_key(futex: &'static hadron_core::sync::Futex) -> u64 {
    let va = hadron_core::addr::VirtAddr::new(futex as *const _ as u64);
    hadron_core::mm::vmm::get_phys_addr(va)
        .map(|pa| pa.as_u64())
        .unwrap_or_else(|| va.as_u64())
}

fn lookup(id: ThreadId) -> Option<&'static Tcb> {
    THREADS.lock().get(&id).copied()
}

/// Spawns a new kernel thread running `body` to completion, with the given
/// base priority and CPU affinity mask. Placement picks the lowest-numbered
/// CPU allowed by `affinity` and is fixed for the thread's lifetime.
pub fn spawn(
    name: &'static str,
    base_priority: u8,
    affinity: u64,
    is_system_critical: bool,
    body: impl Future<Output = ()> + Send + 'static,
) -> ThreadId {
    spawn_boxed(name, base_priority, affinity, is_system_critical, Box::pin(body))
}

fn spawn_boxed(
    name: &'static str,
    base_priority: u8,
    affinity: u64,
    is_system_critical: bool,
    body: ThreadBody,
) -> ThreadId {
    let id = ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    let wrapped: ThreadBody = Box::pin(async move {
        body.await;
        exit_current(ExitCause::Normal);
    });

    let target_cpu = if affinity == 0 {
        0
    } else {
        affinity.trailing_zeros()
    };

    let tcb = Box::leak(Box::new(Tcb::new(
        id,
        name,
        base_priority,
        affinity,
        current().map(|t| t.id),
        wrapped,
    )));
    tcb.is_system_critical.store(is_system_critical, Ordering::Relaxed);
    tcb.cpu.store(target_cpu, Ordering::Relaxed);

    THREADS.lock().insert(id, tcb);
    READY.get_for(target_cpu).lock().push(tcb.priority(), id);
    id
}

/// Returns the thread currently running on this CPU, if any.
pub fn current() -> Option<&'static Tcb> {
    let raw = CURRENT.get().load(Ordering::Relaxed);
    if raw == NO_THREAD {
        None
    } else {
        lookup(ThreadId(raw))
    }
}

/// Marks that `cpu`'s currently running thread used up its time slice on
/// the most recent MAIN-timer tick. Called from the timer interrupt
/// handler; never from the dispatcher itself.
pub fn set_preempt_pending(cpu: u32) {
    PREEMPT_PENDING.get_for(cpu).store(true, Ordering::Relaxed);
}

/// Reads and clears `cpu`'s pending-preemption flag, returning whether it
/// was set.
fn take_preempt_pending(cpu: u32) -> bool {
    PREEMPT_PENDING.get_for(cpu).swap(false, Ordering::Relaxed)
}

/// Re-queues `id` on `cpu`'s ready queue if it is SLEEPING or WAITING.
///
/// Threads already READY, RUNNING, or ZOMBIE are left untouched: the first
/// two are already represented in a queue (or are the current thread, about
/// to be re-queued by the dispatcher itself), and the last is done.
pub fn wake_thread(id: ThreadId, cpu: u32) {
    let Some(tcb) = lookup(id) else { return };
    let mut state = tcb.state.lock();
    if matches!(*state, ThreadState::Sleeping | ThreadState::Waiting) {
        *state = ThreadState::Ready;
        drop(state);
        *tcb.wait_resource.lock() = WaitResource::None;
        READY.get_for(cpu).lock().push(tcb.priority(), id);
        if let Some(current_cpu) = current().map(|t| t.cpu.load(Ordering::Relaxed)) {
            if current_cpu != cpu {
                crate::core_mgr::send_wake_ipi(cpu);
            }
        } else {
            crate::core_mgr::send_wake_ipi(cpu);
        }
    }
}

/// Marks `thread` ZOMBIE with the given exit cause and wakes any joiners.
///
/// Drops the thread's body so it is never polled again. Safe to call on the
/// currently running thread (from within its own poll, or from the signal
/// epilogue acting on it) or on any other thread that is not presently being
/// polled elsewhere.
pub fn exit_thread(thread: &Tcb, cause: ExitCause) {
    *thread.exit_cause.lock() = Some(cause);
    *thread.state.lock() = ThreadState::Zombie;
    thread.body.lock().take();
    thread.join_futex.store(1);
    thread.join_futex.wake(usize::MAX);
}

/// Marks the currently running thread ZOMBIE with the given exit cause.
/// No-op if called from a context with no current thread (e.g. the idle
/// loop itself, which never exits).
pub fn exit_current(cause: ExitCause) {
    if let Some(tcb) = current() {
        exit_thread(tcb, cause);
    }
}

/// Waits for `target` to become ZOMBIE and returns its exit cause.
pub async fn join(target: ThreadId) -> Option<ExitCause> {
    let tcb = lookup(target)?;
    let key = futex_key(&tcb.join_futex);
    FUTEX_TABLE.lookup_or_register(key, &tcb.join_futex);
    if let Some(current_tcb) = current() {
        *current_tcb.wait_resource.lock() = WaitResource::Futex(key);
    }
    loop {
        if *tcb.state.lock() == ThreadState::Zombie {
            return *tcb.exit_cause.lock();
        }
        if let Some(current_tcb) = current() {
            *current_tcb.state.lock() = ThreadState::Waiting;
            current_tcb.begin_wait();
        }
        match tcb.join_futex.wait(0).await {
            WaitOutcome::NotBlocked => continue,
            WaitOutcome::Woken(WakeReason::Cancel) => continue,
            WaitOutcome::Woken(_) => continue,
        }
    }
}

/// Suspends the calling thread until `ticks` MAIN-timer ticks have elapsed.
pub async fn sleep_ticks(ticks: u64) {
    let deadline = timer::ticks() + ticks;
    if deadline <= timer::ticks() {
        return;
    }
    if let Some(tcb) = current() {
        *tcb.state.lock() = ThreadState::Sleeping;
        tcb.begin_wait();
    }
    SleepFuture {
        deadline,
        registered: false,
    }
    .await;
}

struct SleepFuture {
    deadline: u64,
    registered: bool,
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if timer::ticks() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.registered {
            self.registered = true;
            timer::register_sleep_waker(self.deadline, cx.waker().clone());
        }
        Poll::Pending
    }
}

/// [`hadron_core::sync::PriorityAgent`] backing `PRIO_ELEVATION` mutexes:
/// translates the opaque [`hadron_core::sync::OwnerId`] back into a [`Tcb`]
/// and mutates its dynamic priority.
struct SchedPriorityAgent;

impl hadron_core::sync::PriorityAgent for SchedPriorityAgent {
    fn set_priority(&self, owner: hadron_core::sync::OwnerId, priority: u8) -> u8 {
        let Some(thread) = lookup(ThreadId(owner)) else {
            return priority;
        };
        let previous = thread.priority();
        thread.set_priority(priority);
        previous
    }
}

static SCHED_PRIORITY_AGENT: SchedPriorityAgent = SchedPriorityAgent;

/// Registers this scheduler as the priority-inheritance agent for
/// `PRIO_ELEVATION` mutexes. Called once from `boot::kickstart`.
pub fn install_priority_agent() {
    hadron_core::sync::register_priority_agent(&SCHED_PRIORITY_AGENT);
}

/// Spawns the per-CPU idle thread: priority 0, affinity pinned to `cpu`,
/// an infinite `hlt`-and-yield loop. The "last resort" elected only when
/// every other band is empty.
pub fn spawn_idle(cpu: u32) -> ThreadId {
    spawn("idle", IDLE_PRIORITY, 1u64 << cpu, true, async {
        loop {
            core::future::poll_fn(|_cx| {
                // SAFETY: called from the idle thread only, with no locks
                // held; waking from the halt returns straight back here.
                unsafe { hadron_core::arch::x86_64::instructions::interrupts::enable_and_hlt() };
                hadron_core::arch::x86_64::instructions::interrupts::disable();
                Poll::<()>::Pending
            })
            .await;
        }
    })
}

/// Runs the per-CPU dispatcher loop. Never returns.
///
/// Pops the highest-priority ready thread, polls its body once, and either
/// drops it (future completed — `exit_current` has already run), leaves it
/// to whatever wait mechanism it registered with (state moved to SLEEPING
/// or WAITING during the poll), or re-queues it at the back of its own
/// priority band (still READY: round-robin).
///
/// A `poll` call always runs to completion on the calling CPU's own stack:
/// there is no stack switch to return control to the dispatcher mid-call.
/// `take_preempt_pending` only tells the dispatcher that the MAIN timer
/// ticked past the outgoing thread's slice while it held the CPU; it cannot
/// interrupt a `poll` that is already running. A thread that never returns
/// `Pending` monopolizes the CPU regardless of this flag, which is why
/// kernel thread bodies are expected to yield at `.await` points rather
/// than loop indefinitely between them.
pub fn run(cpu: u32) -> ! {
    loop {
        let preempted = take_preempt_pending(cpu);
        let popped = READY.get_for(cpu).lock().pop();
        let Some(id) = popped else {
            // Nothing ready on this CPU. The idle thread is always present
            // in band 0, so in practice this only happens before it spawns.
            continue;
        };
        let Some(tcb) = lookup(id) else { continue };

        CURRENT.get_for(cpu).store(id.0, Ordering::Relaxed);
        *tcb.state.lock() = ThreadState::Running;
        timer::reset_slice();

        let waker = waker::thread_waker(id, cpu);
        let mut cx = Context::from_waker(&waker);
        let body = tcb.body.lock().take();
        if let Some(mut fut) = body {
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending => {
                    *tcb.body.lock() = Some(fut);
                    let mut state = tcb.state.lock();
                    if *state == ThreadState::Running {
                        *state = ThreadState::Ready;
                        drop(state);
                        READY.get_for(cpu).lock().push(tcb.priority(), id);
                        if preempted {
                            hadron_core::kdebug!(
                                "thread {} preempted after time-slice expiry",
                                id.0
                            );
                        }
                    }
                }
            }
        }

        CURRENT.get_for(cpu).store(NO_THREAD, Ordering::Relaxed);
        crate::signal::manage(tcb);
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn ready_queues_pop_highest_priority_first() {
        let mut rq = ReadyQueues::new();
        rq.push(3, ThreadId(1));
        rq.push(10, ThreadId(2));
        rq.push(3, ThreadId(3));
        assert_eq!(rq.pop(), Some(ThreadId(2)));
        assert_eq!(rq.pop(), Some(ThreadId(1)));
        assert_eq!(rq.pop(), Some(ThreadId(3)));
        assert_eq!(rq.pop(), None);
    }

    #[test]
    fn spawn_and_join_collects_exit_cause() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let id = spawn("test", 5, 1, false, async {
            RAN.store(true, Ordering::Relaxed);
        });
        run_until_zombie(0, id);
        assert!(RAN.load(Ordering::Relaxed));
        assert_eq!(
            lookup(id).unwrap().exit_cause.lock().as_ref().copied(),
            Some(ExitCause::Normal)
        );
    }

    /// Test-only helper: drains CPU 0's ready queue until `id` is ZOMBIE,
    /// without halting (there is no idle thread or timer interrupt in a
    /// host test).
    fn run_until_zombie(cpu: u32, id: ThreadId) {
        for _ in 0..1000 {
            if *lookup(id).unwrap().state.lock() == ThreadState::Zombie {
                return;
            }
            let Some(popped) = READY.get_for(cpu).lock().pop() else {
                return;
            };
            let Some(tcb) = lookup(popped) else { continue };
            let waker = waker::thread_waker(popped, cpu);
            let mut cx = Context::from_waker(&waker);
            let body = tcb.body.lock().take();
            if let Some(mut fut) = body {
                if fut.as_mut().poll(&mut cx).is_pending() {
                    *tcb.body.lock() = Some(fut);
                    READY.get_for(cpu).lock().push(tcb.priority(), popped);
                }
            }
        }
        panic!("thread did not reach ZOMBIE within iteration budget");
    }
}
