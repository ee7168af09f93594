//! Signal delivery.
//!
//! Each thread owns a pending-signal bitmask and a handler table (see
//! [`crate::tcb::SignalState`]). This module implements the two entry
//! points that manipulate them: [`raise`], called by anything that wants to
//! notify a thread, and [`manage`], run at the interrupt-return epilogue to
//! actually act on pending signals.

use hadron_core::sync::WakeReason;

use crate::tcb::{ExitCause, Tcb, ThreadState, WaitResource};

/// Illegal instruction.
pub const SIGILL: u8 = 4;
/// Floating point exception.
pub const SIGFPE: u8 = 8;
/// Forced termination.
pub const SIGKILL: u8 = 9;
/// User-defined signal 1 (ignored by default).
pub const SIGUSR1: u8 = 10;
/// Segmentation violation.
pub const SIGSEGV: u8 = 11;
/// User-defined signal 2 (ignored by default).
pub const SIGUSR2: u8 = 12;
/// Generic unhandled-exception signal, for vectors with no more specific
/// mapping.
pub const SIGEXC: u8 = 31;

/// Error returned by signal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The target thread no longer exists / was already reaped.
    NoSuchId,
}

/// Sets `sig` pending on `thread`.
///
/// If the thread is WAITING on a cancellable resource (a futex wait), it is
/// woken immediately with reason `CANCEL` so it can notice the signal
/// without waiting for its resource to become available on its own.
pub fn raise(thread: &Tcb, sig: u8) -> Result<(), SignalError> {
    thread.signals.raise(sig);

    let state = *thread.state.lock();
    if state == ThreadState::Waiting {
        if let WaitResource::Futex(key) = *thread.wait_resource.lock() {
            if let Some(futex) = lookup_futex(key) {
                futex.wake_cancel(1);
            }
        }
    }
    Ok(())
}

/// Hook for looking up a live futex by key. Wired by the futex table owner
/// (the scheduler) so this module does not need to depend on it directly.
fn lookup_futex(_key: u64) -> Option<&'static hadron_core::sync::Futex> {
    crate::sched::futex_table().lookup(_key)
}

/// Returns `true` if `reason` should be treated as a spurious wake that the
/// caller must retry rather than a genuine post/wake.
pub fn is_cancel(reason: WakeReason) -> bool {
    matches!(reason, WakeReason::Cancel)
}

/// Runs at the interrupt-return epilogue for `thread`.
///
/// If any bit is set with a non-null handler, clears the bit and calls the
/// handler directly on the calling CPU's stack before returning to the
/// scheduler. Lowest-numbered signal first. Default handlers for fatal
/// signals terminate the thread instead of returning.
pub fn manage(thread: &Tcb) {
    if *thread.state.lock() == ThreadState::Zombie {
        return;
    }
    loop {
        let Some(sig) = thread.signals.take_lowest_pending() else {
            return;
        };

        if let Some(handler) = thread.signals.handler(sig) {
            deliver_to_handler(handler, sig);
            return;
        }

        match default_disposition(sig) {
            Disposition::Ignore => continue,
            Disposition::Terminate => {
                crate::sched::exit_thread(thread, ExitCause::Signal(sig));
                return;
            }
        }
    }
}

enum Disposition {
    Ignore,
    Terminate,
}

fn default_disposition(sig: u8) -> Disposition {
    match sig {
        SIGUSR1 | SIGUSR2 => Disposition::Ignore,
        _ => Disposition::Terminate,
    }
}

/// Calls `handler` with `sig` directly on the current CPU's stack.
///
/// There is no separate context to resume into afterward: the thread's body
/// is a `Future` polled in place by the dispatcher, so invoking the handler
/// here and letting it return is the entire delivery. A handler that never
/// returns (e.g. `SIGKILL`'s disposition if ever rebound to a handler) would
/// simply never hand control back to `manage`'s caller.
///
/// # Safety invariant
///
/// `handler` must be the address of a function matching `extern "C" fn(u8)`,
/// which [`crate::tcb::SignalState::set_handler`] is the only way to set.
fn deliver_to_handler(handler: usize, sig: u8) {
    // SAFETY: `handler` was registered through `SignalState::set_handler`,
    // the sole writer of the handler table, as an `extern "C" fn(u8)`.
    let handler: extern "C" fn(u8) = unsafe { core::mem::transmute(handler) };
    handler(sig);
}

/// Maps an exception vector to the signal it should raise by default.
pub fn signal_for_exception_vector(vector: u8) -> u8 {
    match vector {
        0 => SIGFPE,       // divide error
        6 => SIGILL,       // invalid opcode
        12 | 13 => SIGSEGV, // stack-segment fault, general protection
        14 => SIGSEGV,     // page fault
        16 | 19 => SIGFPE, // x87 / SIMD floating point
        _ => SIGEXC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disposition_ignores_user_signals() {
        assert!(matches!(default_disposition(SIGUSR1), Disposition::Ignore));
        assert!(matches!(default_disposition(SIGUSR2), Disposition::Ignore));
    }

    #[test]
    fn default_disposition_terminates_fatal_signals() {
        assert!(matches!(
            default_disposition(SIGSEGV),
            Disposition::Terminate
        ));
        assert!(matches!(default_disposition(SIGKILL), Disposition::Terminate));
    }

    #[test]
    fn vector_mapping_covers_common_faults() {
        assert_eq!(signal_for_exception_vector(14), SIGSEGV);
        assert_eq!(signal_for_exception_vector(6), SIGILL);
        assert_eq!(signal_for_exception_vector(2), SIGEXC);
    }

    static LAST_DELIVERED: core::sync::atomic::AtomicU8 = core::sync::atomic::AtomicU8::new(0);

    extern "C" fn record_handler(sig: u8) {
        LAST_DELIVERED.store(sig, core::sync::atomic::Ordering::Relaxed);
    }

    #[test]
    fn deliver_to_handler_calls_through_the_raw_pointer() {
        deliver_to_handler(record_handler as usize, SIGUSR1);
        assert_eq!(
            LAST_DELIVERED.load(core::sync::atomic::Ordering::Relaxed),
            SIGUSR1
        );
    }
}
