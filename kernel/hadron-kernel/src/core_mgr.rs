//! Core Manager: the LAPIC-equivalent reference and AP bring-up.
//!
//! The kernel never talks to interrupt-controller hardware directly. A
//! driver matched against the boot CPU's interrupt controller node (an APIC
//! or GIC device tree entry) registers itself here via [`register_controller`]
//! during its `attach`; everything else in the kernel — IPI wakeups, timer
//! EOI, AP bring-up — goes through the [`CoreController`] trait object that
//! registration installs.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use hadron_core::config::MAX_CPUS;
use hadron_core::sync::IrqSpinLock;

/// Vector used to wake a CPU parked in `hlt` once work is queued for it.
pub const IPI_WAKE_VECTOR: u8 = 240;

/// What the Core Manager needs from whatever interrupt-controller driver
/// claims the boot CPU's controller node.
///
/// A single implementation is installed system-wide via
/// [`register_controller`]; there is exactly one active controller at a
/// time, matching one physical LAPIC/GIC per core cluster.
pub trait CoreController: Send + Sync {
    /// Returns this core's controller-assigned ID (APIC ID / MPIDR, etc).
    fn core_id(&self) -> u8;

    /// Sends an inter-processor interrupt carrying `vector` to the core
    /// identified by controller ID `target`.
    ///
    /// # Safety
    ///
    /// `target` must be a live, brought-up core; `vector` must have (or
    /// intentionally lack) a registered handler.
    unsafe fn send_ipi(&self, target: u8, vector: u8);

    /// Signals end-of-interrupt to the controller for the interrupt most
    /// recently delivered to this core.
    fn end_of_interrupt(&self);

    /// Brings up the application processor with controller ID `target`,
    /// starting execution at `entry_phys` (a 4K-aligned real-mode trampoline
    /// physical address). Returns once the AP has signaled it is alive, or
    /// after a bounded number of retries if it never does.
    fn start_ap(&self, target: u8, entry_phys: u32) -> bool;
}

static CONTROLLER: IrqSpinLock<Option<&'static dyn CoreController>> = IrqSpinLock::new(None);

/// Logical CPU ID -> controller ID, populated as each core is brought up.
static CORE_IDS: [AtomicU8; MAX_CPUS] = [const { AtomicU8::new(0) }; MAX_CPUS];

/// Number of cores known to be running, including the boot CPU.
static CORE_COUNT: AtomicUsize = AtomicUsize::new(1);

/// Installs the system's interrupt controller. Called once, from the
/// matching driver's `attach`.
pub fn register_controller(controller: &'static dyn CoreController) {
    *CONTROLLER.lock() = Some(controller);
}

fn controller() -> Option<&'static dyn CoreController> {
    *CONTROLLER.lock()
}

/// Records `core_id` as the controller ID backing logical CPU `cpu`.
pub fn set_core_id(cpu: u32, core_id: u8) {
    CORE_IDS[cpu as usize % MAX_CPUS].store(core_id, Ordering::Release);
}

/// Returns the controller ID backing logical CPU `cpu`.
pub fn core_id(cpu: u32) -> u8 {
    CORE_IDS[cpu as usize % MAX_CPUS].load(Ordering::Acquire)
}

/// Returns the number of cores brought up so far.
pub fn core_count() -> usize {
    CORE_COUNT.load(Ordering::Acquire)
}

/// Sends the wake IPI to `cpu`, breaking it out of `hlt` in the idle loop.
/// A no-op if no controller has been registered yet (single-core boot).
pub fn send_wake_ipi(cpu: u32) {
    let Some(controller) = controller() else {
        return;
    };
    // SAFETY: `cpu` names a core brought up by `core_mgt_ap_init`, and
    // IPI_WAKE_VECTOR's handler (see `crate::interrupts`) is registered
    // before any AP is started.
    unsafe { controller.send_ipi(core_id(cpu), IPI_WAKE_VECTOR) };
}

/// Signals end-of-interrupt for the interrupt currently being serviced on
/// this core.
pub fn end_of_interrupt() {
    if let Some(controller) = controller() {
        controller.end_of_interrupt();
    }
}

/// Brings up application processor `cpu`, assigning it `core_id` and
/// starting it at `entry_phys`. Returns `false` (and does not advance
/// `core_count`) if no controller is registered or the core never responds.
pub fn core_mgt_ap_init(cpu: u32, core_id_value: u8, entry_phys: u32) -> bool {
    let Some(controller) = controller() else {
        return false;
    };
    if !controller.start_ap(core_id_value, entry_phys) {
        return false;
    }
    set_core_id(cpu, core_id_value);
    CORE_COUNT.fetch_add(1, Ordering::AcqRel);
    true
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicBool;

    use super::*;

    struct FakeController {
        ipi_sent: AtomicBool,
        eoi_sent: AtomicBool,
        ap_started: AtomicBool,
    }

    impl CoreController for FakeController {
        fn core_id(&self) -> u8 {
            0
        }
        unsafe fn send_ipi(&self, _target: u8, _vector: u8) {
            self.ipi_sent.store(true, Ordering::Relaxed);
        }
        fn end_of_interrupt(&self) {
            self.eoi_sent.store(true, Ordering::Relaxed);
        }
        fn start_ap(&self, _target: u8, _entry_phys: u32) -> bool {
            self.ap_started.store(true, Ordering::Relaxed);
            true
        }
    }

    static FAKE: FakeController = FakeController {
        ipi_sent: AtomicBool::new(false),
        eoi_sent: AtomicBool::new(false),
        ap_started: AtomicBool::new(false),
    };

    #[test]
    fn ap_init_advances_core_count_on_success() {
        register_controller(&FAKE);
        let before = core_count();
        assert!(core_mgt_ap_init(1, 4, 0x8000));
        assert_eq!(core_count(), before + 1);
        assert_eq!(core_id(1), 4);
        assert!(FAKE.ap_started.load(Ordering::Relaxed));
    }

    #[test]
    fn send_wake_ipi_reaches_registered_controller() {
        register_controller(&FAKE);
        send_wake_ipi(0);
        assert!(FAKE.ipi_sent.load(Ordering::Relaxed));
    }
}
