//! GDT and TSS setup for the boot CPU.

use core::cell::UnsafeCell;

use hadron_core::arch::x86_64::structures::gdt::{
    Descriptor, Gdt, SegmentSelector, TaskStateSegment,
};
use hadron_core::sync::LazyLock;

/// Double-fault handler stack size (16 KiB).
const DOUBLE_FAULT_STACK_SIZE: usize = 16384;

/// IST index used for the double-fault handler (IST1, 1-indexed).
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

#[repr(align(16))]
struct AlignedStack([u8; DOUBLE_FAULT_STACK_SIZE]);

static DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);

/// `UnsafeCell<T>` wrapper that is `Sync`. The TSS is only mutated with
/// interrupts disabled, during a context switch; the CPU reads it on ring
/// transitions without racing a concurrent write.
#[repr(transparent)]
struct SyncUnsafeCell<T>(UnsafeCell<T>);

// SAFETY: writes are serialized by disabling interrupts before mutation.
unsafe impl<T> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    const fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    fn get(&self) -> *mut T {
        self.0.get()
    }
}

static TSS: LazyLock<SyncUnsafeCell<TaskStateSegment>> = LazyLock::new(|| {
    let mut tss = TaskStateSegment::new();
    tss.interrupt_stack_table[(DOUBLE_FAULT_IST_INDEX - 1) as usize] = {
        let stack_start = &DOUBLE_FAULT_STACK as *const _ as u64;
        stack_start + DOUBLE_FAULT_STACK_SIZE as u64
    };
    tss.privilege_stack_table[0] = hadron_core::percpu::early_kernel_rsp();
    SyncUnsafeCell::new(tss)
});

/// Cached segment selectors from GDT initialization.
pub struct Selectors {
    /// Kernel code segment selector.
    pub kernel_code: SegmentSelector,
    /// Kernel data segment selector.
    pub kernel_data: SegmentSelector,
    /// User code segment selector.
    pub user_code: SegmentSelector,
    /// User data segment selector.
    pub user_data: SegmentSelector,
    /// TSS selector.
    pub tss: SegmentSelector,
}

static GDT: LazyLock<(Gdt, Selectors)> = LazyLock::new(|| {
    let mut gdt = Gdt::new();
    let kernel_code = gdt.add_entry(Descriptor::kernel_code_segment());
    let kernel_data = gdt.add_entry(Descriptor::kernel_data_segment());
    // user_data before user_code: SYSRET requires SS at STAR[63:48]+8,
    // CS at STAR[63:48]+16.
    let user_data = gdt.add_entry(Descriptor::user_data_segment());
    let user_code = gdt.add_entry(Descriptor::user_code_segment());
    // SAFETY: the TSS is fully built by the closure above before this runs.
    let tss = gdt.add_entry(Descriptor::tss_segment(unsafe { &*TSS.get() }));
    let selectors = Selectors {
        kernel_code,
        kernel_data,
        user_code,
        user_data,
        tss,
    };
    (gdt, selectors)
});

/// Initializes the GDT, reloads segment registers, and loads the TSS.
///
/// # Safety
///
/// Must be called exactly once during early boot, before any interrupt can
/// fire.
pub unsafe fn init() {
    use hadron_core::arch::x86_64::instructions::segmentation::{
        load_ds, load_es, load_fs, load_gs, load_ss, load_tss, set_cs,
    };

    let (gdt, selectors) = &*GDT;

    // SAFETY: descriptors built above are well-formed; selectors match the
    // layout (kernel_code in CS, kernel_data in DS/SS, TSS in TR).
    unsafe {
        gdt.load();
        set_cs(selectors.kernel_code);
        load_ds(selectors.kernel_data);
        load_ss(selectors.kernel_data);
        load_es(SegmentSelector::new(0, 0));
        load_fs(SegmentSelector::new(0, 0));
        load_gs(SegmentSelector::new(0, 0));
        load_tss(selectors.tss);
    }

    hadron_core::kdebug!("GDT initialized");
}

/// Updates RSP0 in the TSS (the ring-3 -> ring-0 stack pointer).
///
/// # Safety
///
/// `rsp` must point to the top of a valid, mapped kernel stack.
pub unsafe fn set_tss_rsp0(rsp: u64) {
    // SAFETY: interrupts are disabled by the caller during a context
    // switch, so there is no concurrent software access; the CPU reads the
    // TSS only on privilege transitions, not between entry and IRET.
    unsafe {
        (*TSS.get()).privilege_stack_table[0] = rsp;
    }
}

/// Returns the cached segment selectors.
pub fn selectors() -> &'static Selectors {
    &GDT.1
}
