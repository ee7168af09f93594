//! Architecture-specific kernel glue, gated behind the target architecture.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::{create_virtual_cpu, switch_context, VCpuState};

/// Performs architecture bring-up for the boot CPU.
///
/// # Safety
///
/// Must run once, early in boot, before interrupts are enabled.
#[cfg(target_arch = "x86_64")]
pub unsafe fn cpu_init() {
    // SAFETY: caller guarantees this runs once during early boot.
    unsafe { x86_64::cpu_init() };
}
