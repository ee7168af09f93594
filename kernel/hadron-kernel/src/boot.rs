//! Kickstart routine: the kernel's single entry point.
//!
//! A bootloader stub constructs a [`BootInfo`] implementation from its own
//! native data and calls [`kickstart`]. Static dispatch keeps the boot path
//! monomorphized per bootloader with no indirection cost.
//!
//! The sequence is architecture bring-up, device-tree probing (which
//! registers the core and timer controllers as a side effect of driver
//! `attach`), scheduler bring-up, then handing control to the dispatcher.
//! There is no filesystem, process, or syscall layer to bring up afterward:
//! probing drivers and entering the scheduler is the entire boot sequence.

use hadron_core::kinfo;
use hadron_fdt::Fdt;

/// Bootloader-agnostic information the kickstart routine needs.
///
/// Each bootloader stub implements this by converting its native data into
/// these few fields before calling [`kickstart`].
pub trait BootInfo {
    /// Raw flattened device tree blob, accessible via the identity or HHDM
    /// mapping already active when the bootloader hands off control.
    fn device_tree(&self) -> &[u8];

    /// Logical id of the CPU executing this call. `0` for the boot CPU.
    fn boot_cpu(&self) -> u32;
}

/// Runs the kernel's boot sequence on `boot_info` and enters the scheduler.
///
/// Never returns: the final step is [`crate::sched::run`], which loops
/// forever dispatching ready threads.
pub fn kickstart(boot_info: &impl BootInfo) -> ! {
    // A. Architecture bring-up: GDT, IDT, exception/IRQ trampolines.
    // SAFETY: called once, here, before anything enables interrupts.
    unsafe { crate::arch::cpu_init() };
    kinfo!("architecture initialized");

    // B. The interrupt dispatch table is ready for registration as soon as
    // `cpu_init` installs the IDT; the exception/IRQ handlers attach during device probing below.
    crate::interrupts::interrupt_register(
        crate::core_mgr::IPI_WAKE_VECTOR,
        |_vector, _ip, _err| {},
    )
    .ok();

    // C. No IOAPIC/LAPIC driver claims the interrupt-controller role in
    // this kernel, so the MAIN timer rides the legacy 8259 pair directly:
    // remap it clear of the exception range, wire IRQ0 to the tick
    // handler, and start PIT channel 0 in periodic mode.
    // SAFETY: runs once, here, before interrupts are enabled.
    unsafe { hadron_core::arch::x86_64::pic8259::remap() };
    crate::interrupts::interrupt_register(
        hadron_core::arch::x86_64::pic8259::PIC1_OFFSET,
        crate::sched::timer::irq_handler,
    )
    .ok();
    crate::time::register_timer(crate::time::TimerRole::Main, &crate::sched::timer::MAIN_CLOCK)
        .expect("MAIN timer role bound exactly once during boot");
    // SAFETY: channel 2 one-shot calibration, if any, has already run;
    // interrupts are still disabled.
    unsafe { hadron_core::arch::x86_64::pit::init_periodic(crate::sched::timer::TICK_HZ) };
    // SAFETY: IRQ0's handler is registered above.
    unsafe { hadron_core::arch::x86_64::pic8259::unmask(0) };
    kinfo!("MAIN timer armed at {} Hz", crate::sched::timer::TICK_HZ);

    // D. Parse the device tree and probe it: every matching driver attaches,
    // registering itself as a `CoreController` (L) or `ClockSource` (F) as a
    // side effect.
    match Fdt::parse(boot_info.device_tree()) {
        Ok(fdt) => {
            crate::devtree::probe(&fdt);
            kinfo!("device tree probed");
        }
        Err(err) => {
            kinfo!("no usable device tree ({err:?}); running with no drivers");
        }
    }

    // E. Virtual memory is already live by the time a bootloader stub can
    // call this function: `hadron_core::mm`'s HHDM/PMM/VMM bring-up runs in
    // the stub itself, ahead of `kickstart`, before driver probing.

    // G/J/K. Bring up the cooperative scheduler: register this scheduler as
    // the priority-inheritance agent before anything can contend a
    // `PRIO_ELEVATION` mutex, switch logging over to the async syslog
    // queue, then spawn the idle thread, the deferred-interrupt executor,
    // and the syslog drain thread for the boot CPU, all system-critical.
    crate::sched::install_priority_agent();
    // SAFETY: runs once, here, before any other CPU or interrupt handler
    // can observe a half-installed log sink.
    unsafe { crate::syslog::init() };
    let cpu = boot_info.boot_cpu();
    crate::sched::spawn_idle(cpu);
    crate::deferred::spawn_executor(cpu);
    crate::syslog::spawn_drain_thread(cpu);
    kinfo!("idle, deferred-irq, and syslog threads spawned on cpu {cpu}");

    // Enable interrupts now that the IDT, device drivers, and the threads
    // able to handle their wakeups all exist.
    // SAFETY: architecture init, driver probing, and scheduler bring-up for
    // this CPU are all complete.
    unsafe { hadron_core::arch::x86_64::instructions::interrupts::enable() };
    kinfo!("interrupts enabled, entering scheduler");

    enter_scheduler(cpu)
}

/// Hands control to the cooperative scheduler on `cpu`. Never returns.
pub fn enter_scheduler(cpu: u32) -> ! {
    crate::sched::run(cpu)
}
