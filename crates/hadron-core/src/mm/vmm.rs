//! Kernel virtual memory manager.
//!
//! Ties [`MemoryLayout`], [`BitmapAllocator`], and the architecture's
//! [`PageMapper`]/[`PageTranslator`] together into the four operations
//! every other subsystem actually calls: [`kernel_map`] (map an existing
//! physical range), [`kernel_allocate`] (allocate fresh frames and map
//! them), [`kernel_unmap`] (tear a mapping down), and [`get_phys_addr`]
//! (walk the live page tables). [`init`] must run once, after the PMM and
//! HHDM are both live, before any of the four are called.
//!
//! Each kernel-arena region (`heap`, `stacks`, `mmio`) is handed out by a
//! simple per-region bump cursor: virtual address space within a region is
//! never reclaimed, only the physical frames and page table entries backing
//! it. A long-running kernel would need a real VA allocator per region;
//! this one never runs out before physical memory does on realistic boot
//! configurations.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::addr::{PhysAddr, VirtAddr};
use crate::arch::x86_64::paging::PageTableMapper;
use crate::arch::x86_64::registers::control::Cr3;
use crate::mm::layout::{FaultRegion, MemoryLayout};
use crate::mm::mapper::{MapFlags, PageMapper, PageTranslator};
use crate::mm::pmm::BitmapAllocator;
use crate::mm::{VmmError, PAGE_SIZE};
use crate::paging::{Page, PhysFrame, Size4KiB};
use crate::sync::IrqSpinLock;

struct State {
    layout: MemoryLayout,
    pmm: &'static BitmapAllocator,
    mapper: PageTableMapper,
}

static STATE: IrqSpinLock<Option<State>> = IrqSpinLock::new(None);

/// Per-region bump cursor: the byte offset from the region's base that the
/// next allocation will start at.
struct Cursor(AtomicU64);

impl Cursor {
    const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Reserves `size` bytes, returning the offset it starts at, or `None`
    /// if the region's maximum size would be exceeded.
    fn reserve(&self, size: u64, region_max: u64) -> Option<u64> {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let end = current.checked_add(size)?;
            if end > region_max {
                return None;
            }
            match self
                .0
                .compare_exchange_weak(current, end, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Some(current),
                Err(observed) => current = observed,
            }
        }
    }
}

static HEAP_CURSOR: Cursor = Cursor::new();
static STACKS_CURSOR: Cursor = Cursor::new();
static MMIO_CURSOR: Cursor = Cursor::new();

/// Initializes the virtual memory manager. Must run exactly once, after the
/// PMM and HHDM are both live.
pub fn init(layout: MemoryLayout, pmm: &'static BitmapAllocator) {
    let mapper = PageTableMapper::new(layout.hhdm_base.as_u64());
    *STATE.lock() = Some(State { layout, pmm, mapper });
}

fn assert_page_aligned(value: u64, what: &str) {
    assert!(
        value % PAGE_SIZE as u64 == 0,
        "{what} must be page-aligned, got {value:#x}"
    );
}

/// Maps an existing physical range into the kernel arena. `phys` and `size`
/// must be page-aligned. [`MapFlags::HARDWARE`] routes the mapping into the
/// MMIO arena instead of the general-purpose one; it skips the frame
/// allocator either way since the caller already owns `phys`.
///
/// Returns the mapped kernel virtual address, or [`VmmError::RegionExhausted`]
/// if the target arena is full.
pub fn kernel_map(phys: PhysAddr, size: u64, flags: MapFlags) -> Result<VirtAddr, VmmError> {
    assert_page_aligned(phys.as_u64(), "kernel_map physical address");
    assert_page_aligned(size, "kernel_map size");

    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vmm::init must run before kernel_map");

    let (region, cursor) = if flags.contains(MapFlags::HARDWARE) {
        (&state.layout.mmio, &MMIO_CURSOR)
    } else {
        (&state.layout.heap, &HEAP_CURSOR)
    };
    let offset = cursor
        .reserve(size, region.max_size())
        .ok_or(VmmError::RegionExhausted)?;
    let base_va = region.base() + offset;

    let root = Cr3::read();
    let pages = size / PAGE_SIZE as u64;
    for i in 0..pages {
        let page = Page::<Size4KiB>::from_start_address(base_va + i * PAGE_SIZE as u64)
            .expect("bump cursor stays page-aligned");
        let frame = PhysFrame::<Size4KiB>::from_start_address(PhysAddr::new_truncate(
            phys.as_u64() + i * PAGE_SIZE as u64,
        ))
        .expect("caller-supplied physical address is page-aligned");
        // SAFETY: `root` is the live top-level table; the bump cursor never
        // hands out the same virtual page twice.
        let flush = unsafe {
            state
                .mapper
                .map(root, page, frame, flags, &mut || intermediate_frame(state.pmm))
        };
        flush.flush();
    }
    Ok(base_va)
}

/// Allocates `size` bytes of fresh physical memory and maps it into the
/// kernel arena. [`MapFlags::GUARD`] leaves one unmapped page immediately
/// before the returned address, for kernel stacks.
///
/// Returns [`VmmError::OutOfMemory`] if the PMM cannot satisfy the request,
/// or [`VmmError::RegionExhausted`] if the target arena is full.
pub fn kernel_allocate(size: u64, flags: MapFlags) -> Result<VirtAddr, VmmError> {
    assert_page_aligned(size, "kernel_allocate size");

    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vmm::init must run before kernel_allocate");

    let pages = size / PAGE_SIZE as u64;
    let guard_pages: u64 = if flags.contains(MapFlags::GUARD) { 1 } else { 0 };
    if (state.pmm.free_frames() as u64) < pages {
        return Err(VmmError::OutOfMemory);
    }

    let cursor = &STACKS_CURSOR;
    let region = &state.layout.stacks;
    let reserved = (pages + guard_pages) * PAGE_SIZE as u64;
    let offset = cursor
        .reserve(reserved, region.max_size())
        .ok_or(VmmError::RegionExhausted)?;
    let mapped_base = region.base() + offset + guard_pages * PAGE_SIZE as u64;

    let root = Cr3::read();
    for i in 0..pages {
        let frame = state.pmm.allocate_frame().ok_or(VmmError::OutOfMemory)?;
        let page = Page::<Size4KiB>::from_start_address(mapped_base + i * PAGE_SIZE as u64)
            .expect("bump cursor stays page-aligned");
        // SAFETY: `root` is the live top-level table; `frame` was just
        // allocated and is not mapped anywhere else.
        let flush = unsafe {
            state
                .mapper
                .map(root, page, frame, flags, &mut || intermediate_frame(state.pmm))
        };
        flush.flush();
    }
    Ok(mapped_base)
}

/// Tears down the mapping covering `[va, va + size)`. For RAM mappings
/// (anything outside the MMIO arena), the backing frames are returned to
/// the PMM; MMIO mappings are left owned by whoever handed the address to
/// [`kernel_map`].
///
/// # Panics
///
/// Panics if `va` or `size` is not page-aligned, matching the unconditional
/// panic on structural misuse described for this operation.
pub fn kernel_unmap(va: VirtAddr, size: u64) -> Result<(), VmmError> {
    assert_page_aligned(va.as_u64(), "kernel_unmap address");
    assert_page_aligned(size, "kernel_unmap size");

    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vmm::init must run before kernel_unmap");

    let return_frames = !matches!(state.layout.identify_region(va), FaultRegion::Mmio);
    let root = Cr3::read();
    let pages = size / PAGE_SIZE as u64;
    for i in 0..pages {
        let page = Page::<Size4KiB>::from_start_address(va + i * PAGE_SIZE as u64)
            .expect("caller-supplied address is page-aligned");
        // SAFETY: `root` is the live top-level table.
        let (frame, flush) = unsafe {
            state
                .mapper
                .unmap(root, page)
                .map_err(|_| VmmError::NotMapped)?
        };
        flush.flush();
        if return_frames {
            // SAFETY: the mapping just removed owned this frame exclusively.
            unsafe { let _ = state.pmm.deallocate_frame(frame); }
        }
    }
    Ok(())
}

/// Walks the live page tables for `va` and returns its mapped physical
/// address, or `None` if any level is not present.
pub fn get_phys_addr(va: VirtAddr) -> Option<PhysAddr> {
    let guard = STATE.lock();
    let state = guard.as_ref().expect("vmm::init must run before get_phys_addr");
    let root = Cr3::read();
    // SAFETY: `root` is the live top-level table.
    unsafe { state.mapper.translate_addr(root, va) }
}

fn intermediate_frame(pmm: &BitmapAllocator) -> PhysFrame<Size4KiB> {
    pmm.allocate_frame()
        .expect("out of physical memory allocating an intermediate page table")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_reserve_respects_region_max() {
        let cursor = Cursor::new();
        assert_eq!(cursor.reserve(4096, 8192), Some(0));
        assert_eq!(cursor.reserve(4096, 8192), Some(4096));
        assert_eq!(cursor.reserve(4096, 8192), None);
    }

    #[test]
    #[should_panic(expected = "must be page-aligned")]
    fn kernel_map_rejects_unaligned_size() {
        assert_page_aligned(100, "kernel_map size");
    }
}
