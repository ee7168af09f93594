//! Legacy 8259 Programmable Interrupt Controller driver.
//!
//! No IOAPIC/LAPIC driver is registered as a [`crate::sched`]
//! [`crate::core_mgr::CoreController`] in this kernel yet, so IRQ0's
//! interrupt path runs through the 8259 pair directly rather than through
//! that trait: remap both PICs off the CPU exception range, mask every
//! line but the one a driver asks for, and acknowledge with the plain
//! `outb(0x20, 0x20)` / `outb(0xA0, 0x20)` EOI sequence.

use super::Port;

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;

/// Vector offset the primary PIC's IRQ0-7 are remapped to.
pub const PIC1_OFFSET: u8 = 32;
/// Vector offset the secondary PIC's IRQ8-15 are remapped to.
pub const PIC2_OFFSET: u8 = 40;

/// Remaps both PICs so IRQ0-7 land on vectors 32-39 and IRQ8-15 on 40-47,
/// clear of the CPU exception range, then masks every line.
///
/// # Safety
///
/// Must be called once during boot with interrupts disabled, before any
/// line is unmasked.
pub unsafe fn remap() {
    let cmd1 = Port::<u8>::new(PIC1_CMD);
    let data1 = Port::<u8>::new(PIC1_DATA);
    let cmd2 = Port::<u8>::new(PIC2_CMD);
    let data2 = Port::<u8>::new(PIC2_DATA);

    // SAFETY: well-known PIC command/data ports; caller guarantees this
    // runs once, early, with interrupts disabled.
    unsafe {
        cmd1.write(ICW1_INIT | ICW1_ICW4);
        cmd2.write(ICW1_INIT | ICW1_ICW4);
        data1.write(PIC1_OFFSET);
        data2.write(PIC2_OFFSET);
        data1.write(4); // Tell PIC1 it has a secondary PIC cascaded on IRQ2.
        data2.write(2); // Tell PIC2 its cascade identity.
        data1.write(ICW4_8086);
        data2.write(ICW4_8086);

        // Mask every line; drivers unmask the ones they own.
        data1.write(0xFF);
        data2.write(0xFF);
    }
}

/// Unmasks `irq` (0-15).
///
/// # Safety
///
/// Must be called after [`remap`]. `irq` must correspond to a handler
/// already registered at its remapped vector.
pub unsafe fn unmask(irq: u8) {
    let (port, bit) = if irq < 8 {
        (Port::<u8>::new(PIC1_DATA), irq)
    } else {
        (Port::<u8>::new(PIC2_DATA), irq - 8)
    };
    // SAFETY: well-known PIC data port; caller guarantees `remap` already ran.
    unsafe {
        let mask = port.read();
        port.write(mask & !(1 << bit));
    }
}

/// Sends end-of-interrupt for `irq` (0-15), cascading to the secondary PIC
/// first if the line lives there.
///
/// # Safety
///
/// Must be called from the handler servicing `irq`, after remap.
pub unsafe fn send_eoi(irq: u8) {
    let cmd1 = Port::<u8>::new(PIC1_CMD);
    let cmd2 = Port::<u8>::new(PIC2_CMD);
    // SAFETY: well-known PIC command ports.
    unsafe {
        if irq >= 8 {
            cmd2.write(0x20);
        }
        cmd1.write(0x20);
    }
}
