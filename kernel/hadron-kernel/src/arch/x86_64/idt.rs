//! IDT setup: wires every vector to its const-generic trampoline.

use hadron_core::arch::x86_64::structures::idt::InterruptDescriptorTable;
use hadron_core::sync::LazyLock;

use super::gdt::DOUBLE_FAULT_IST_INDEX;
use super::trampoline::{exception_handler, exception_handler_err, IRQ_TRAMPOLINES};

static IDT: LazyLock<InterruptDescriptorTable> = LazyLock::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    idt.divide_error.set_handler(exception_handler::<0>());
    idt.debug.set_handler(exception_handler::<1>());
    idt.nmi.set_handler(exception_handler::<2>());
    idt.breakpoint
        .set_handler(exception_handler::<3>())
        .set_dpl(3);
    idt.overflow.set_handler(exception_handler::<4>());
    idt.bound_range.set_handler(exception_handler::<5>());
    idt.invalid_opcode.set_handler(exception_handler::<6>());
    idt.device_not_available
        .set_handler(exception_handler::<7>());
    idt.double_fault
        .set_handler_with_err_code(exception_handler_err::<8>())
        .set_ist_index(DOUBLE_FAULT_IST_INDEX);
    idt.invalid_tss
        .set_handler_with_err_code(exception_handler_err::<10>());
    idt.segment_not_present
        .set_handler_with_err_code(exception_handler_err::<11>());
    idt.stack_segment_fault
        .set_handler_with_err_code(exception_handler_err::<12>());
    idt.general_protection
        .set_handler_with_err_code(exception_handler_err::<13>());
    idt.page_fault
        .set_handler_with_err_code(exception_handler_err::<14>());
    idt.x87_floating_point
        .set_handler(exception_handler::<16>());
    idt.alignment_check
        .set_handler_with_err_code(exception_handler_err::<17>());
    idt.machine_check.set_handler(exception_handler::<18>());
    idt.simd_floating_point
        .set_handler(exception_handler::<19>());
    idt.virtualization.set_handler(exception_handler::<20>());
    idt.control_protection
        .set_handler_with_err_code(exception_handler_err::<21>());
    idt.hypervisor_injection
        .set_handler(exception_handler::<28>());
    idt.vmm_communication
        .set_handler_with_err_code(exception_handler_err::<29>());
    idt.security_exception
        .set_handler_with_err_code(exception_handler_err::<30>());

    for (i, trampoline) in IRQ_TRAMPOLINES.iter().enumerate() {
        idt.interrupts[i].set_handler(*trampoline);
    }

    idt
});

/// Loads the IDT into the CPU.
///
/// # Safety
///
/// Must be called after GDT initialization (CS must already be valid).
pub unsafe fn init() {
    // SAFETY: IDT is 'static and every handler above is a valid code address.
    unsafe { IDT.load() };
    hadron_core::kdebug!("IDT initialized");
}
