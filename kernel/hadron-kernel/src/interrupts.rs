//! Architecture-independent interrupt dispatch.
//!
//! [`crate::arch::x86_64::trampoline`]'s const-generic stubs all forward
//! here with a bare vector number, fault address, and error code, so the
//! actual dispatch pipeline is written once regardless of architecture:
//!
//! 1. classify the vector as an exception (< 32) or an IRQ (>= 32);
//! 2. exceptions: run a registered override if present, otherwise tag the
//!    current thread's [`crate::tcb::ErrorContext`] and raise the mapped
//!    signal;
//! 3. IRQs: run the registered handler, if any;
//! 4. run the interrupt-return epilogue ([`crate::signal::manage`]) against
//!    whatever thread was running when the interrupt fired.
//!
//! Registration goes through a single lock that serializes handler
//! mutation against dispatch, so a handler is never observed half-written.

use hadron_core::sync::IrqSpinLock;

use crate::tcb::ErrorContext;

/// Number of IRQ lines dispatchable through [`interrupt_register`]: vectors
/// 32 through 255 inclusive.
pub const NUM_INTERRUPT_LINES: usize = 224;

/// Number of CPU exception vectors: 0 through 31 inclusive.
pub const NUM_EXCEPTION_LINES: usize = 32;

/// A registered handler: given the vector, faulting instruction pointer
/// (IRQs: return address into the interrupted code), and architecture
/// error code (0 if the vector has none).
pub type Handler = fn(u8, u64, u64);

/// Error returned by the registration API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    /// The vector does not belong to the table being modified.
    UnauthorizedInterruptLine,
    /// A `None` handler was supplied where one is required.
    NullPointer,
    /// A handler is already registered on this line.
    AlreadyExist,
    /// No handler is registered on this line.
    NoSuchId,
}

static IRQ_TABLE: IrqSpinLock<[Option<Handler>; NUM_INTERRUPT_LINES]> =
    IrqSpinLock::new([None; NUM_INTERRUPT_LINES]);

static EXCEPTION_TABLE: IrqSpinLock<[Option<Handler>; NUM_EXCEPTION_LINES]> =
    IrqSpinLock::new([None; NUM_EXCEPTION_LINES]);

fn irq_index(vector: u8) -> Result<usize, InterruptError> {
    if vector as usize >= 32 {
        Ok(vector as usize - 32)
    } else {
        Err(InterruptError::UnauthorizedInterruptLine)
    }
}

/// Registers `handler` on IRQ `vector` (32..=255). Fails if a handler is
/// already registered there.
pub fn interrupt_register(vector: u8, handler: Handler) -> Result<(), InterruptError> {
    let idx = irq_index(vector)?;
    let mut table = IRQ_TABLE.lock();
    if table[idx].is_some() {
        return Err(InterruptError::AlreadyExist);
    }
    table[idx] = Some(handler);
    Ok(())
}

/// Removes the handler registered on IRQ `vector`. Fails if none is set.
pub fn interrupt_remove(vector: u8) -> Result<(), InterruptError> {
    let idx = irq_index(vector)?;
    let mut table = IRQ_TABLE.lock();
    if table[idx].is_none() {
        return Err(InterruptError::NoSuchId);
    }
    table[idx] = None;
    Ok(())
}

/// Registers an override `handler` for exception `vector` (0..32), run
/// instead of the default tag-and-signal behavior.
pub fn exception_register(vector: u8, handler: Handler) -> Result<(), InterruptError> {
    if vector as usize >= NUM_EXCEPTION_LINES {
        return Err(InterruptError::UnauthorizedInterruptLine);
    }
    let mut table = EXCEPTION_TABLE.lock();
    let slot = &mut table[vector as usize];
    if slot.is_some() {
        return Err(InterruptError::AlreadyExist);
    }
    *slot = Some(handler);
    Ok(())
}

/// Removes the override registered for exception `vector`, if any.
pub fn exception_remove(vector: u8) -> Result<(), InterruptError> {
    if vector as usize >= NUM_EXCEPTION_LINES {
        return Err(InterruptError::UnauthorizedInterruptLine);
    }
    let mut table = EXCEPTION_TABLE.lock();
    let slot = &mut table[vector as usize];
    if slot.is_none() {
        return Err(InterruptError::NoSuchId);
    }
    *slot = None;
    Ok(())
}

/// Entry point called by every trampoline stub, architecture-independent.
///
/// `error_code` is 0 for vectors that have none (the trampoline layer
/// already normalizes this).
pub fn dispatch(vector: u8, fault_ip: u64, error_code: u64) {
    if (vector as usize) < NUM_EXCEPTION_LINES {
        dispatch_exception(vector, fault_ip, error_code);
    } else {
        dispatch_irq(vector, fault_ip, error_code);
        if let Some(thread) = crate::sched::current() {
            crate::signal::manage(thread);
        }
    }
}

fn dispatch_exception(vector: u8, fault_ip: u64, error_code: u64) {
    let override_handler = EXCEPTION_TABLE.lock()[vector as usize];
    if let Some(handler) = override_handler {
        handler(vector, fault_ip, error_code);
        return;
    }

    let Some(thread) = crate::sched::current() else {
        // No thread context (early boot, or the idle loop) — nothing to
        // tag or signal; an exception this early is unrecoverable.
        panic!("unhandled exception {vector} with no running thread (ip={fault_ip:#x})");
    };
    *thread.error_context.lock() = ErrorContext {
        fault_ip,
        error_code,
        vector,
    };
    let sig = crate::signal::signal_for_exception_vector(vector);
    let _ = crate::signal::raise(thread, sig);
    crate::signal::manage(thread);

    // A fatal signal's default disposition terminates the thread (see
    // `crate::signal::default_disposition`), but execution here is still
    // on the faulting thread's own kernel stack at the exact faulting
    // instruction: there is no safe way to unwind back into the
    // dispatcher from a bare `x86-interrupt` handler. Termination is
    // recorded (the thread is ZOMBIE and its next poll will never
    // happen), but the CPU itself cannot keep running this context.
    if *thread.state.lock() == crate::tcb::ThreadState::Zombie {
        panic!("thread {:?} terminated by signal during exception {vector}", thread.id);
    }
}

fn dispatch_irq(vector: u8, fault_ip: u64, error_code: u64) {
    let handler = IRQ_TABLE.lock()[vector as usize - 32];
    if let Some(handler) = handler {
        handler(vector, fault_ip, error_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: u8, _: u64, _: u64) {}

    #[test]
    fn register_rejects_exception_vectors() {
        assert_eq!(
            interrupt_register(5, noop),
            Err(InterruptError::UnauthorizedInterruptLine)
        );
    }

    #[test]
    fn register_then_duplicate_fails() {
        assert!(interrupt_register(40, noop).is_ok());
        assert_eq!(interrupt_register(40, noop), Err(InterruptError::AlreadyExist));
        assert!(interrupt_remove(40).is_ok());
    }

    #[test]
    fn remove_without_register_fails() {
        assert_eq!(interrupt_remove(41), Err(InterruptError::NoSuchId));
    }

    #[test]
    fn exception_register_round_trips() {
        assert!(exception_register(9, noop).is_ok());
        assert_eq!(exception_register(9, noop), Err(InterruptError::AlreadyExist));
        assert!(exception_remove(9).is_ok());
        assert_eq!(exception_remove(9), Err(InterruptError::NoSuchId));
    }

    #[test]
    fn exception_register_rejects_out_of_range() {
        assert_eq!(
            exception_register(32, noop),
            Err(InterruptError::UnauthorizedInterruptLine)
        );
    }
}
