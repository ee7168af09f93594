//! Compile-time Kconfig-style constants shared across the kernel.
//!
//! Centralizes the tunables that size fixed-capacity structures throughout
//! `hadron-core` and `hadron-kernel`: a single source of truth for array
//! bounds (`percpu::MAX_CPUS`, `sync::futex::FUTEX_MAX_WAITERS`) rather than
//! scattering magic numbers.

/// Maximum number of logical CPUs the scheduler can bring up.
pub use crate::percpu::MAX_CPUS;

/// Maximum number of concurrently-blocked futex waiters system-wide.
pub use crate::sync::futex::FUTEX_MAX_WAITERS;

/// Number of entries in a thread's per-signal handler table.
///
/// Signal numbers are indices into this table; `THREAD_MAX_SIGNALS` bounds
/// both the handler table and the pending-signal bitmask, so it must not
/// exceed the bit width of the mask type used for that bitmask (`u32`).
pub const THREAD_MAX_SIGNALS: usize = 32;

/// Number of distinct dynamic-priority bands in the ready queue.
///
/// Priority `0` is reserved for the idle thread; `NUM_PRIORITIES - 1` is the
/// highest band, used by the deferred-interrupt executor thread.
pub const NUM_PRIORITIES: usize = 64;

/// Default time-slice length, in timer ticks, granted to a thread before
/// the scheduler considers preempting it for another ready thread at the
/// same priority.
pub const DEFAULT_TIME_SLICE_TICKS: u32 = 10;
