//! Interrupt-related instructions.

use crate::arch::x86_64::registers::rflags::{self, RFlags};

/// Disables interrupts (CLI).
#[inline]
pub fn disable() {
    // SAFETY: CLI has no side effects beyond masking maskable interrupts.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
    }
}

/// Enables interrupts (STI).
///
/// # Safety
///
/// The caller must ensure that enabling interrupts is safe in the current
/// context (e.g., the IDT is loaded).
#[inline]
pub unsafe fn enable() {
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
    }
}

/// Returns `true` if interrupts are currently enabled (IF flag set).
#[inline]
pub fn are_enabled() -> bool {
    rflags::read().contains(RFlags::INTERRUPT_FLAG)
}

/// Halts the CPU until the next interrupt (HLT).
#[inline]
pub fn hlt() {
    // SAFETY: HLT simply suspends execution until an interrupt arrives.
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Atomically enables interrupts and halts the CPU.
///
/// `sti` delays interrupt delivery until after the following instruction,
/// so the halt is guaranteed to execute before any pending interrupt is
/// serviced.
///
/// # Safety
///
/// The caller must ensure that enabling interrupts is safe in the current
/// context.
#[inline]
pub unsafe fn enable_and_hlt() {
    unsafe {
        core::arch::asm!("sti; hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Disables interrupts and returns the previous IF state, for the local
/// critical-section layer (save/restore around per-CPU data access).
#[inline]
pub fn save_and_disable() -> bool {
    let was_enabled = are_enabled();
    disable();
    was_enabled
}

/// Restores a previously saved interrupt-enable state.
///
/// # Safety
///
/// The caller must ensure that re-enabling interrupts (if `was_enabled`)
/// is safe in the current context.
#[inline]
pub unsafe fn restore(was_enabled: bool) {
    if was_enabled {
        unsafe { enable() };
    }
}

/// Executes the given closure with interrupts disabled, restoring the
/// previous interrupt state afterward. Grounds the "local critical section"
/// layer used when touching per-CPU data that may be aliased by a handler.
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let was_enabled = save_and_disable();
    let result = f();
    // SAFETY: restores exactly the state observed on entry.
    unsafe { restore(was_enabled) };
    result
}
