//! Architecture-independent page mapping contracts.
//!
//! [`PageMapper`] is implemented once per architecture (see
//! `arch::x86_64::paging::PageTableMapper`) and lets the virtual memory
//! manager map, unmap, and re-protect pages without depending on the host
//! page table format.

use crate::addr::{PhysAddr, VirtAddr};
use crate::paging::{Page, PageSize, PhysFrame};

bitflags::bitflags! {
    /// Arch-independent mapping permissions, translated to native page table
    /// flags by each [`PageMapper`] implementation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        /// The mapping is writable.
        const WRITABLE     = 1 << 0;
        /// The mapping may be executed. Absent by default (NX).
        const EXECUTABLE   = 1 << 1;
        /// The mapping is accessible from ring 3.
        const USER         = 1 << 2;
        /// The mapping is not flushed from the TLB on a CR3 switch.
        const GLOBAL       = 1 << 3;
        /// The mapping bypasses the cache (MMIO).
        const CACHE_DISABLE = 1 << 4;
        /// Routes a [`super::vmm::kernel_map`] call at an existing device
        /// MMIO range into the kernel's hardware-mapping arena instead of
        /// the heap arena. Not a real page table bit: every [`PageMapper`]
        /// implementation's flag translation only inspects the bits above,
        /// so this one passes through untranslated.
        const HARDWARE = 1 << 5;
        /// Leaves a leading guard page unmapped before a
        /// [`super::vmm::kernel_allocate`] allocation, for kernel stacks.
        /// Like [`MapFlags::HARDWARE`], this is a VMM routing bit only.
        const GUARD = 1 << 6;
    }
}

/// Error returned by [`PageMapper`] unmap and update-flags operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmapError {
    /// The page is not mapped.
    NotMapped,
    /// The existing mapping uses a different page size than requested.
    SizeMismatch,
}

/// A pending TLB invalidation for a single page.
///
/// Returned by mapping operations instead of flushing immediately, so
/// callers can batch several mappings and flush once. Dropping a
/// [`MapFlush`] without calling [`MapFlush::flush`] is safe but leaves the
/// TLB stale for that address until the next full flush.
#[must_use = "mappings are not visible to the CPU until this is flushed"]
pub struct MapFlush(VirtAddr);

impl MapFlush {
    /// Creates a pending flush for `addr`.
    pub fn new(addr: VirtAddr) -> Self {
        Self(addr)
    }

    /// Invalidates the TLB entry for this mapping's address.
    pub fn flush(self) {
        crate::arch::x86_64::instructions::tlb::flush(self.0);
    }

    /// Discards this flush without invalidating the TLB.
    ///
    /// Useful when the caller already knows a full TLB flush (address space
    /// switch) is coming.
    pub fn ignore(self) {}
}

/// Maps, unmaps, and re-protects pages of a single size `S` in a page table
/// rooted at an arbitrary physical address.
///
/// # Safety
///
/// Implementations manipulate live page tables directly; callers must
/// ensure `root` refers to a valid, architecture-correct table and that
/// concurrent modification of the same table is externally synchronized.
pub unsafe trait PageMapper<S: PageSize> {
    /// Maps `page` to `frame` with `flags`, allocating intermediate page
    /// tables from `alloc` as needed.
    ///
    /// # Safety
    /// `root` must point to a valid top-level table for this architecture.
    unsafe fn map(
        &self,
        root: PhysAddr,
        page: Page<S>,
        frame: PhysFrame<S>,
        flags: MapFlags,
        alloc: &mut dyn FnMut() -> PhysFrame<crate::paging::Size4KiB>,
    ) -> MapFlush;

    /// Removes the mapping for `page`, returning the frame it was mapped to.
    ///
    /// # Safety
    /// `root` must point to a valid top-level table for this architecture.
    unsafe fn unmap(&self, root: PhysAddr, page: Page<S>) -> Result<(PhysFrame<S>, MapFlush), UnmapError>;

    /// Changes the permission flags of an existing mapping.
    ///
    /// # Safety
    /// `root` must point to a valid top-level table for this architecture.
    unsafe fn update_flags(
        &self,
        root: PhysAddr,
        page: Page<S>,
        flags: MapFlags,
    ) -> Result<MapFlush, UnmapError>;
}

/// Translates virtual addresses to physical addresses, independent of page size.
///
/// # Safety
///
/// Implementations must walk the actual, live page table; a `Some` result
/// must reflect a genuinely present mapping.
pub unsafe trait PageTranslator {
    /// Translates `virt` to its mapped physical address, if any, regardless
    /// of which page size covers it.
    ///
    /// # Safety
    /// `root` must point to a valid top-level table for this architecture.
    unsafe fn translate_addr(&self, root: PhysAddr, virt: VirtAddr) -> Option<PhysAddr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_flags_are_disjoint_bits() {
        let flags = MapFlags::WRITABLE | MapFlags::USER;
        assert!(flags.contains(MapFlags::WRITABLE));
        assert!(flags.contains(MapFlags::USER));
        assert!(!flags.contains(MapFlags::EXECUTABLE));
    }

    #[test]
    fn map_flush_ignore_does_not_panic() {
        MapFlush::new(VirtAddr::new_truncate(0x1000)).ignore();
    }
}
