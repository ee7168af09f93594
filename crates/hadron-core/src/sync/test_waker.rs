//! A no-op [`Waker`] for synchronously polling futures in tests.

use core::task::{RawWaker, RawWakerVTable, Waker};

fn clone(_: *const ()) -> RawWaker {
    raw()
}
fn wake(_: *const ()) {}
fn wake_by_ref(_: *const ()) {}
fn drop(_: *const ()) {}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);

fn raw() -> RawWaker {
    RawWaker::new(core::ptr::null(), &VTABLE)
}

/// Returns a [`Waker`] whose `wake` calls do nothing.
///
/// Useful for driving a future's `poll` manually in a test without needing
/// a real executor to observe the wakeup.
pub fn noop_waker() -> Waker {
    // SAFETY: the vtable's functions satisfy the `RawWaker` contract: `clone`
    // returns an equivalent waker, and `wake`/`wake_by_ref`/`drop` are no-ops
    // that never touch the null data pointer.
    unsafe { Waker::from_raw(raw()) }
}
