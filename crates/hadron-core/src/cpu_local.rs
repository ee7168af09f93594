//! Alias for [`percpu`](super::percpu)'s per-CPU storage types.
//!
//! Synchronization primitives (lock debugging, IRQ nesting depth) address
//! per-CPU storage through this module name rather than `percpu` directly,
//! matching the plain `cpu_local` naming used elsewhere in the workspace.

pub use crate::percpu::{cpu_is_initialized, current_cpu_id, CpuLocal, MAX_CPUS};
