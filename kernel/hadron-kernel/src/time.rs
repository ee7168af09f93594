//! Time Manager: the kernel's four timer roles.
//!
//! The kernel never talks to timer hardware directly; a driver matched
//! against a device tree timer node registers itself as a [`ClockSource`]
//! under one of the four roles during its `attach`. Everything else reads
//! time through [`now_nanos`] / [`boot_nanos`] rather than the driver.
//!
//! - [`TimerRole::Main`] drives the MAIN-timer tick handler
//!   ([`crate::sched::timer`]): one interrupt per scheduling quantum.
//! - [`TimerRole::Rtc`] backs wall-clock time (battery-backed real-time
//!   clock), independent of boot-relative ticks.
//! - [`TimerRole::Aux`] is a free-running auxiliary counter available to
//!   drivers that need a second, independently-programmable timer.
//! - [`TimerRole::Lifetime`] never stops or resets across a suspend, for
//!   monotonic measurements that must survive it.

use hadron_core::sync::IrqSpinLock;

/// A hardware time source the kernel can query for elapsed nanoseconds.
pub trait ClockSource: Send + Sync {
    /// Short identifier for diagnostics, e.g. `"pit"` or `"hpet"`.
    fn name(&self) -> &'static str;

    /// Nanoseconds elapsed since this source's own epoch (boot, power-on,
    /// or the Unix epoch for [`TimerRole::Rtc`]).
    fn now_nanos(&self) -> u64;

    /// Smallest nanosecond increment this source can distinguish. Callers
    /// comparing two `now_nanos` readings should not treat a difference
    /// smaller than this as significant.
    fn resolution_nanos(&self) -> u64;
}

/// Errors returned by [`register_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// `role` already has a registered source; call [`unregister_timer`]
    /// first if replacing it is intentional.
    AlreadyBound,
}

/// Which of the four timer roles a [`ClockSource`] backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRole {
    /// Drives the scheduling tick.
    Main,
    /// Wall-clock / real-time clock.
    Rtc,
    /// Free-running auxiliary counter.
    Aux,
    /// Survives suspend; never resets.
    Lifetime,
}

const NUM_ROLES: usize = 4;

fn role_index(role: TimerRole) -> usize {
    match role {
        TimerRole::Main => 0,
        TimerRole::Rtc => 1,
        TimerRole::Aux => 2,
        TimerRole::Lifetime => 3,
    }
}

static SOURCES: IrqSpinLock<[Option<&'static dyn ClockSource>; NUM_ROLES]> =
    IrqSpinLock::new([None; NUM_ROLES]);

/// Registers `source` for `role`.
///
/// Fails with [`TimerError::AlreadyBound`] if `role` already has a source;
/// unlike the earlier silent-overwrite behavior, a second driver probing
/// the same role is a configuration error, not a valid hand-off.
pub fn register_timer(role: TimerRole, source: &'static dyn ClockSource) -> Result<(), TimerError> {
    let mut sources = SOURCES.lock();
    let slot = &mut sources[role_index(role)];
    if slot.is_some() {
        return Err(TimerError::AlreadyBound);
    }
    *slot = Some(source);
    Ok(())
}

/// Clears `role`'s registered source, if any. Used by driver teardown and
/// tests that need to re-register a different source for the same role.
pub fn unregister_timer(role: TimerRole) {
    SOURCES.lock()[role_index(role)] = None;
}

/// Returns nanoseconds elapsed according to `role`'s source, or `0` if no
/// driver has registered for that role yet.
pub fn now_nanos(role: TimerRole) -> u64 {
    SOURCES.lock()[role_index(role)].map_or(0, |source| source.now_nanos())
}

/// Nanoseconds elapsed since boot, per [`TimerRole::Main`].
pub fn boot_nanos() -> u64 {
    now_nanos(TimerRole::Main)
}

/// Current MAIN-timer tick count (1 tick = 1 ms), derived from `boot_nanos`.
///
/// [`crate::sched::timer`] keeps its own independently-incremented tick
/// counter driven directly by the timer interrupt; this is the
/// free-running equivalent derived from the clock source itself, useful
/// for cross-checking drift.
pub fn derived_tick_count() -> u64 {
    boot_nanos() / 1_000_000
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    struct FakeClock(AtomicU64);

    impl ClockSource for FakeClock {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn now_nanos(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
        fn resolution_nanos(&self) -> u64 {
            1
        }
    }

    static FAKE: FakeClock = FakeClock(AtomicU64::new(0));

    #[test]
    fn unregistered_role_reads_zero() {
        assert_eq!(now_nanos(TimerRole::Aux), 0);
    }

    #[test]
    fn registered_role_reads_through_to_source() {
        unregister_timer(TimerRole::Main);
        FAKE.0.store(5_000_000, Ordering::Relaxed);
        register_timer(TimerRole::Main, &FAKE).unwrap();
        assert_eq!(boot_nanos(), 5_000_000);
        assert_eq!(derived_tick_count(), 5);
        unregister_timer(TimerRole::Main);
    }

    #[test]
    fn second_registration_on_same_role_is_rejected() {
        unregister_timer(TimerRole::Rtc);
        register_timer(TimerRole::Rtc, &FAKE).unwrap();
        assert_eq!(
            register_timer(TimerRole::Rtc, &FAKE),
            Err(TimerError::AlreadyBound)
        );
        unregister_timer(TimerRole::Rtc);
    }
}
