//! Global Descriptor Table structures.

use core::arch::asm;

/// A GDT or IDT selector: a 16-bit index into the table plus an RPL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSelector(u16);

impl SegmentSelector {
    /// Builds a selector from a table index and requested privilege level.
    #[inline]
    pub const fn new(index: u16, rpl: u8) -> Self {
        Self((index << 3) | (rpl as u16 & 0x3))
    }

    /// The null selector.
    pub const NULL: Self = Self(0);

    /// Wraps a raw selector value as read from a segment register.
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw 16-bit selector value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the table index this selector refers to.
    #[inline]
    pub const fn index(self) -> u16 {
        self.0 >> 3
    }

    /// Returns the requested privilege level (0-3).
    #[inline]
    pub const fn rpl(self) -> u8 {
        (self.0 & 0x3) as u8
    }
}

/// The operand of `lgdt`/`lidt`: a table base address plus its size limit.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    /// Size of the table in bytes, minus one.
    pub limit: u16,
    /// Linear base address of the table.
    pub base: u64,
}

bitflags::bitflags! {
    /// GDT descriptor access and flag bits shared by code, data, and TSS entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u64 {
        /// Accessed bit, set by the CPU on first use.
        const ACCESSED        = 1 << 40;
        /// Readable (code) or writable (data).
        const WRITABLE        = 1 << 41;
        /// Conforming (code) or direction (data).
        const CONFORMING      = 1 << 42;
        /// Executable: distinguishes code segments from data segments.
        const EXECUTABLE      = 1 << 43;
        /// Descriptor type: 1 for code/data, 0 for system segments (TSS, LDT).
        const USER_SEGMENT    = 1 << 44;
        /// Descriptor privilege level, bit 0.
        const DPL_RING_3      = 3 << 45;
        /// Present bit.
        const PRESENT         = 1 << 47;
        /// Long mode code segment (64-bit).
        const LONG_MODE       = 1 << 53;
        /// Default operand size (32-bit code/data when set and not `LONG_MODE`).
        const DEFAULT_SIZE    = 1 << 54;
        /// Granularity: limit is scaled by 4 KiB when set.
        const GRANULARITY     = 1 << 55;
    }
}

/// A single GDT entry: either a flat code/data descriptor or one half of a
/// 16-byte TSS descriptor.
#[derive(Debug, Clone, Copy)]
pub enum Descriptor {
    /// A 64-bit code or data segment descriptor (8 bytes).
    UserSegment(u64),
    /// A 64-bit TSS descriptor, stored as two consecutive GDT entries.
    SystemSegment(u64, u64),
}

impl Descriptor {
    /// The kernel-mode 64-bit code segment descriptor.
    #[inline]
    pub const fn kernel_code_segment() -> Self {
        let flags = DescriptorFlags::USER_SEGMENT.bits()
            | DescriptorFlags::PRESENT.bits()
            | DescriptorFlags::EXECUTABLE.bits()
            | DescriptorFlags::LONG_MODE.bits()
            | DescriptorFlags::WRITABLE.bits();
        Descriptor::UserSegment(flags)
    }

    /// The kernel-mode data segment descriptor.
    #[inline]
    pub const fn kernel_data_segment() -> Self {
        let flags = DescriptorFlags::USER_SEGMENT.bits()
            | DescriptorFlags::PRESENT.bits()
            | DescriptorFlags::WRITABLE.bits();
        Descriptor::UserSegment(flags)
    }

    /// The ring-3 64-bit code segment descriptor.
    #[inline]
    pub const fn user_code_segment() -> Self {
        let flags = DescriptorFlags::USER_SEGMENT.bits()
            | DescriptorFlags::PRESENT.bits()
            | DescriptorFlags::EXECUTABLE.bits()
            | DescriptorFlags::LONG_MODE.bits()
            | DescriptorFlags::WRITABLE.bits()
            | DescriptorFlags::DPL_RING_3.bits();
        Descriptor::UserSegment(flags)
    }

    /// The ring-3 data segment descriptor.
    #[inline]
    pub const fn user_data_segment() -> Self {
        let flags = DescriptorFlags::USER_SEGMENT.bits()
            | DescriptorFlags::PRESENT.bits()
            | DescriptorFlags::WRITABLE.bits()
            | DescriptorFlags::DPL_RING_3.bits();
        Descriptor::UserSegment(flags)
    }

    /// Builds a TSS descriptor pointing at `tss`.
    pub fn tss_segment(tss: &'static TaskStateSegment) -> Self {
        let ptr = tss as *const _ as u64;
        let mut low = DescriptorFlags::PRESENT.bits();
        low.set_base_low(ptr);
        low |= (core::mem::size_of::<TaskStateSegment>() as u64 - 1) & 0xFFFF;
        low |= 0b1001 << 40; // type = available 64-bit TSS
        let high = ptr >> 32;
        Descriptor::SystemSegment(low, high)
    }
}

/// Bit-twiddling helpers for packing a base address into a descriptor's low
/// qword, split across the legacy base-15:0 / base-23:16 / base-31:24 fields.
trait SetBaseLow {
    fn set_base_low(&mut self, base: u64);
}

impl SetBaseLow for u64 {
    fn set_base_low(&mut self, base: u64) {
        *self |= (base & 0xFF_FFFF) << 16;
        *self |= ((base >> 24) & 0xFF) << 56;
    }
}

/// The 64-bit Task State Segment.
///
/// Only the fields the kernel actually uses are populated: the privilege
/// stack table (ring transitions) and interrupt stack table (IST, used for
/// double-fault and NMI handling on a known-good stack).
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TaskStateSegment {
    reserved_1: u32,
    /// Stack pointers loaded on a ring transition to rings 0-2.
    pub privilege_stack_table: [u64; 3],
    reserved_2: u64,
    /// Stack pointers available to `IST` fields in IDT gate descriptors.
    pub interrupt_stack_table: [u64; 7],
    reserved_3: u64,
    reserved_4: u16,
    /// Offset from the TSS base to the I/O permission bit map.
    pub iomap_base: u16,
}

impl TaskStateSegment {
    /// Creates a new, empty TSS with no privilege or interrupt stacks set.
    #[inline]
    pub const fn new() -> Self {
        Self {
            reserved_1: 0,
            privilege_stack_table: [0; 3],
            reserved_2: 0,
            interrupt_stack_table: [0; 7],
            reserved_3: 0,
            reserved_4: 0,
            iomap_base: core::mem::size_of::<Self>() as u16,
        }
    }
}

impl Default for TaskStateSegment {
    fn default() -> Self {
        Self::new()
    }
}

/// A Global Descriptor Table: the null descriptor plus up to 7 additional
/// entries (code/data segments and one 16-byte TSS descriptor).
pub struct Gdt {
    table: [u64; 8],
    len: usize,
}

impl Gdt {
    /// Creates an empty GDT containing only the mandatory null descriptor.
    #[inline]
    pub const fn new() -> Self {
        Self {
            table: [0; 8],
            len: 1,
        }
    }

    /// Appends a descriptor and returns the selector that refers to it.
    ///
    /// # Panics
    ///
    /// Panics if the table is full (a [`Descriptor::SystemSegment`] needs
    /// two free slots).
    pub fn add_entry(&mut self, descriptor: Descriptor) -> SegmentSelector {
        let index = match descriptor {
            Descriptor::UserSegment(value) => {
                let index = self.push(value);
                index
            }
            Descriptor::SystemSegment(low, high) => {
                let index = self.push(low);
                self.push(high);
                index
            }
        };
        SegmentSelector::new(index as u16, 0)
    }

    fn push(&mut self, value: u64) -> usize {
        assert!(self.len < self.table.len(), "GDT is full");
        let index = self.len;
        self.table[index] = value;
        self.len += 1;
        index
    }

    /// Loads this GDT into the CPU via the `lgdt` instruction.
    ///
    /// # Safety
    ///
    /// `self` must be `'static` and remain unmodified while loaded. The
    /// caller must reload CS and the data segment registers afterward.
    pub unsafe fn load(&'static self) {
        let ptr = DescriptorTablePointer {
            limit: (self.len * core::mem::size_of::<u64>() - 1) as u16,
            base: self.table.as_ptr() as u64,
        };
        unsafe {
            asm!(
                "lgdt [{}]",
                in(reg) &ptr,
                options(readonly, nostack, preserves_flags),
            );
        }
    }
}

impl Default for Gdt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_packs_index_and_rpl() {
        let sel = SegmentSelector::new(3, 3);
        assert_eq!(sel.index(), 3);
        assert_eq!(sel.rpl(), 3);
        assert_eq!(sel.as_u16(), (3 << 3) | 3);
    }

    #[test]
    fn from_raw_round_trips() {
        let sel = SegmentSelector::from_raw(0x2B);
        assert_eq!(sel.index(), 5);
        assert_eq!(sel.rpl(), 3);
    }

    #[test]
    fn gdt_add_entry_advances_index() {
        let mut gdt = Gdt::new();
        let code = gdt.add_entry(Descriptor::kernel_code_segment());
        let data = gdt.add_entry(Descriptor::kernel_data_segment());
        assert_eq!(code.index(), 1);
        assert_eq!(data.index(), 2);
    }

    #[test]
    fn tss_segment_uses_two_slots() {
        static TSS: TaskStateSegment = TaskStateSegment::new();
        let mut gdt = Gdt::new();
        let _code = gdt.add_entry(Descriptor::kernel_code_segment());
        let tss_sel = gdt.add_entry(Descriptor::tss_segment(&TSS));
        assert_eq!(tss_sel.index(), 2);
        let next = gdt.add_entry(Descriptor::kernel_data_segment());
        assert_eq!(next.index(), 4);
    }
}
