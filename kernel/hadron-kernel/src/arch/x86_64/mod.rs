//! x86_64 kernel glue: GDT/TSS, IDT, and the vCPU context switch.

pub mod gdt;
pub mod idt;
pub mod trampoline;
pub mod vcpu;

pub use vcpu::{create_virtual_cpu, switch_context, VCpuState};

/// Performs architecture bring-up for the boot CPU: GDT, TSS, IDT.
///
/// # Safety
///
/// Must run once, early in boot, before interrupts are enabled.
pub unsafe fn cpu_init() {
    // SAFETY: caller guarantees this runs once during early boot.
    unsafe {
        gdt::init();
        idt::init();
    }
}
