//! Virtual-CPU save area and context switch for x86_64.
//!
//! [`VCpuState`] is the opaque save area a stackful context switch would
//! build and restore; its layout is ABI-compatible with [`switch_context`],
//! the assembly context-switch routine. Only the callee-saved registers
//! plus `rsp`/`rip` are saved here — the System V ABI guarantees the
//! caller-saved registers are already on the stack (or dead) at a
//! function-call boundary, and entry/exit from interrupt context separately
//! saves/restores the full register file into the stack frame before ever
//! reaching `switch_context`.
//!
//! Kernel threads do not use any of this: `crate::sched` drives every
//! thread as a `Future` polled from the dispatcher's own stack, so there is
//! never a second kernel stack to switch to. These primitives are kept as
//! the building blocks a future ring-3/process implementation would need
//! for a real stackful context switch; nothing in the scheduler calls them
//! today.

use hadron_core::addr::VirtAddr;

/// Saved callee-saved registers plus stack/instruction pointers.
///
/// `#[repr(C)]` with a fixed field order: `switch_context` indexes into this
/// struct by known offsets.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct VCpuState {
    /// Saved stack pointer. Offset 0 — the pivot point of the switch.
    pub rsp: u64,
    pub(crate) r15: u64,
    pub(crate) r14: u64,
    pub(crate) r13: u64,
    pub(crate) r12: u64,
    pub(crate) rbx: u64,
    pub(crate) rbp: u64,
    /// CR3 value (physical address of the address space's top-level table).
    pub cr3: u64,
}

/// Entry trampoline invoked the first time a fresh thread is scheduled.
///
/// Reads the real entry point and argument off the stack (pushed by
/// [`create_virtual_cpu`]) and calls into it. If the entry function ever
/// returns, the thread exits with [`crate::tcb::ExitCause::Normal`].
extern "C" fn thread_entry_trampoline(entry: extern "C" fn(usize), argument: usize) -> ! {
    entry(argument);
    crate::sched::exit_current(crate::tcb::ExitCause::Normal);
}

/// Builds a fresh [`VCpuState`] whose stack is primed so that the first
/// context switch into it enters `entry(argument)` on `stack_top`.
///
/// `stack_top` must be 16-byte aligned and point one past the end of a
/// valid, mapped kernel stack, with its guard page already in place below
/// the allocation.
pub fn create_virtual_cpu(
    entry: extern "C" fn(usize),
    argument: usize,
    stack_top: VirtAddr,
    cr3: u64,
) -> VCpuState {
    // SAFETY: `stack_top` is caller-guaranteed to be a valid, writable,
    // aligned kernel stack top; we only write within its bounds.
    unsafe {
        let mut sp = stack_top.as_u64() as *mut u64;
        // Reserve room for the two trampoline arguments plus the return
        // address switch_context will `ret` into.
        sp = sp.sub(1);
        *sp = thread_entry_trampoline as usize as u64;
        // switch_context's `ret` pops this as the resume IP; rdi/rsi must
        // already hold `entry`/`argument` per the System V calling
        // convention, which switch_context restores from the saved GPRs
        // below before the final `ret`.
        VCpuState {
            rsp: sp as u64,
            r15: argument as u64,
            r14: entry as usize as u64,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            cr3,
        }
    }
}

/// Switches the CPU from `prev`'s context to `next`'s context.
///
/// Saves the callee-saved registers and stack pointer into `*prev`, loads
/// them from `*next`, and returns "into" whatever `next` was last switched
/// out of (or [`thread_entry_trampoline`] on a thread's first run).
///
/// # Safety
///
/// Both pointers must reference live [`VCpuState`]s belonging to threads
/// that are not concurrently running elsewhere. Must be called with
/// interrupts disabled.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(prev: *mut VCpuState, next: *const VCpuState) {
    core::arch::naked_asm!(
        // Save prev's callee-saved registers and RSP.
        "mov [rdi + 0x30], rbp",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x00], rsp",
        // Load next's CR3 if it differs (paging::reload_cr3_if_needed is the
        // non-naked wrapper; here we inline the bare switch for speed).
        "mov rax, [rsi + 0x38]",
        "mov rcx, cr3",
        "cmp rax, rcx",
        "je 2f",
        "mov cr3, rax",
        "2:",
        // Restore next's callee-saved registers and RSP.
        "mov rbp, [rsi + 0x30]",
        "mov rbx, [rsi + 0x28]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x18]",
        "mov r14, [rsi + 0x10]",
        "mov r15, [rsi + 0x08]",
        "mov rsp, [rsi + 0x00]",
        // First-run threads need entry/argument in rdi/rsi for the
        // trampoline; r14/r15 double as that storage until first switch.
        "mov rdi, r14",
        "mov rsi, r15",
        "ret",
    );
}
