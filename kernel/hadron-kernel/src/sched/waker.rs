//! Waker implementation for kernel threads.
//!
//! Packs a [`ThreadId`] and target CPU into the `RawWaker` data pointer.
//! Waking re-queues the thread on its **target CPU's** ready queue at its
//! current dynamic priority — not necessarily the CPU doing the waking.
//!
//! Encoding (64-bit data pointer):
//! - Bits 63-56: target CPU id (8 bits, matches `hadron_core::config::MAX_CPUS`)
//! - Bits 55-0:  `ThreadId` (56 bits)

use core::task::{RawWaker, RawWakerVTable, Waker};

use crate::tcb::ThreadId;

const ID_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;
const CPU_SHIFT: u32 = 56;

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);

/// Creates a [`Waker`] that re-queues `id` on `cpu`'s ready queue when woken.
pub fn thread_waker(id: ThreadId, cpu: u32) -> Waker {
    // SAFETY: the vtable below only ever reads back what `pack` encoded.
    unsafe { Waker::from_raw(raw_waker(id, cpu)) }
}

fn pack(id: ThreadId, cpu: u32) -> *const () {
    (((cpu as u64) << CPU_SHIFT) | (id.0 & ID_MASK)) as *const ()
}

fn unpack(data: *const ()) -> (ThreadId, u32) {
    let raw = data as u64;
    (ThreadId(raw & ID_MASK), (raw >> CPU_SHIFT) as u32)
}

fn raw_waker(id: ThreadId, cpu: u32) -> RawWaker {
    RawWaker::new(pack(id, cpu), &VTABLE)
}

fn clone(data: *const ()) -> RawWaker {
    RawWaker::new(data, &VTABLE)
}

fn wake(data: *const ()) {
    wake_by_ref(data);
}

fn wake_by_ref(data: *const ()) {
    let (id, cpu) = unpack(data);
    super::wake_thread(id, cpu);
}

fn drop_waker(_data: *const ()) {
    // Packed data is Copy; nothing to free.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let (id, cpu) = unpack(pack(ThreadId(0x1234), 7));
        assert_eq!(id, ThreadId(0x1234));
        assert_eq!(cpu, 7);
    }
}
