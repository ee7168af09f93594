//! Control registers (CR0, CR2, CR3, CR4).

use crate::addr::PhysAddr;

bitflags::bitflags! {
    /// CR0 flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cr0Flags: u64 {
        /// Protected mode enable.
        const PROTECTED_MODE_ENABLE = 1 << 0;
        /// Math coprocessor monitoring.
        const MONITOR_COPROCESSOR   = 1 << 1;
        /// FPU emulation.
        const EMULATE_COPROCESSOR   = 1 << 2;
        /// Automatic FPU state save on task switch.
        const TASK_SWITCHED         = 1 << 3;
        /// Write protect: CPL0 code cannot write read-only pages.
        const WRITE_PROTECT         = 1 << 16;
        /// Alignment mask.
        const ALIGNMENT_MASK        = 1 << 18;
        /// Not write-through (disables write-through caching).
        const NOT_WRITE_THROUGH     = 1 << 29;
        /// Cache disable.
        const CACHE_DISABLE         = 1 << 30;
        /// Paging enable.
        const PAGING                = 1 << 31;
    }
}

bitflags::bitflags! {
    /// CR4 flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cr4Flags: u64 {
        /// Virtual-8086 mode extensions.
        const VME                       = 1 << 0;
        /// Protected-mode virtual interrupts.
        const PVI                       = 1 << 1;
        /// Time stamp disable (restrict RDTSC to CPL0).
        const TIMESTAMP_DISABLE         = 1 << 2;
        /// Debugging extensions.
        const DEBUGGING_EXTENSIONS      = 1 << 3;
        /// Page size extension (4 MiB pages).
        const PAGE_SIZE_EXTENSION       = 1 << 4;
        /// Physical address extension (required for long mode).
        const PHYSICAL_ADDRESS_EXTENSION = 1 << 5;
        /// Machine check enable.
        const MACHINE_CHECK_EXCEPTION   = 1 << 6;
        /// Page global enable.
        const PAGE_GLOBAL               = 1 << 7;
        /// Performance monitoring counter enable.
        const PERFORMANCE_MONITOR_COUNTER = 1 << 8;
        /// FXSAVE/FXRSTOR and SSE enable.
        const OSFXSR                    = 1 << 9;
        /// Unmasked SSE exceptions.
        const OSXMMEXCPT                = 1 << 10;
        /// User mode instruction prevention.
        const UMIP                      = 1 << 11;
        /// 5-level paging (LA57).
        const L5_PAGING                 = 1 << 12;
        /// VMX enable.
        const VMXE                      = 1 << 13;
        /// SMX enable.
        const SMXE                      = 1 << 14;
        /// FSGSBASE enable (RDFSBASE/WRFSBASE/RDGSBASE/WRGSBASE).
        const FSGSBASE                  = 1 << 16;
        /// PCID enable.
        const PCID                      = 1 << 17;
        /// XSAVE and processor extended states enable.
        const OSXSAVE                   = 1 << 18;
        /// Supervisor mode execution prevention.
        const SMEP                      = 1 << 20;
        /// Supervisor mode access prevention.
        const SMAP                      = 1 << 21;
        /// Protection key enable.
        const PKE                       = 1 << 22;
    }
}

/// CR0 — system control flags.
pub struct Cr0;

impl Cr0 {
    /// Reads the current CR0 value.
    #[inline]
    pub fn read() -> Cr0Flags {
        let val: u64;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        Cr0Flags::from_bits_truncate(val)
    }

    /// Writes a new CR0 value.
    ///
    /// # Safety
    ///
    /// Disabling paging or write protection while running kernel code can
    /// corrupt memory or crash the machine.
    #[inline]
    pub unsafe fn write(flags: Cr0Flags) {
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) flags.bits(), options(nostack, preserves_flags));
        }
    }
}

/// CR2 — the linear address that caused the most recent page fault.
pub struct Cr2;

impl Cr2 {
    /// Reads the faulting address from the last page fault.
    ///
    /// Stored as a raw `u64` because CR2 may hold a non-canonical address.
    #[inline]
    pub fn read() -> u64 {
        let val: u64;
        unsafe {
            core::arch::asm!("mov {}, cr2", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        val
    }
}

/// CR3 — physical address of the top-level page table (PML4), plus PCID bits.
pub struct Cr3;

impl Cr3 {
    /// Reads the current page table root, discarding any PCID bits.
    #[inline]
    pub fn read() -> PhysAddr {
        let val: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        PhysAddr::new(val & 0x000F_FFFF_FFFF_F000)
    }

    /// Writes a new page table root. Flushes all non-global TLB entries.
    ///
    /// # Safety
    ///
    /// `addr` must point to a valid, fully-populated PML4 table that remains
    /// valid for as long as it is loaded.
    #[inline]
    pub unsafe fn write(addr: PhysAddr) {
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) addr.as_u64(), options(nostack, preserves_flags));
        }
    }
}

/// CR4 — extended system control flags.
pub struct Cr4;

impl Cr4 {
    /// Reads the current CR4 value.
    #[inline]
    pub fn read() -> Cr4Flags {
        let val: u64;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) val, options(nomem, nostack, preserves_flags));
        }
        Cr4Flags::from_bits_truncate(val)
    }

    /// Writes a new CR4 value.
    ///
    /// # Safety
    ///
    /// Toggling paging-mode-affecting bits (PAE, PCID, LA57) while paging is
    /// active is undefined behavior.
    #[inline]
    pub unsafe fn write(flags: Cr4Flags) {
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) flags.bits(), options(nostack, preserves_flags));
        }
    }
}
