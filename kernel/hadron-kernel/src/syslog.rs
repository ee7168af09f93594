//! Syslog: asynchronous, thread-drained log record queue.
//!
//! [`init`] registers [`enqueue`] as the kernel's leveled log sink
//! (`hadron_core::log::set_log_fn`), so `kdebug!`/`kinfo!`/`kwarn!`/`kerror!`
//! never touch the console directly. A call formats its arguments into a
//! fixed-size record and pushes it onto a bounded queue, waking the drain
//! thread spawned by [`spawn_drain_thread`]; the console write itself
//! happens later, off the caller's stack. A record that would overflow the
//! queue is dropped and counted in [`dropped_count`] rather than blocking
//! the caller, so a wedged console never stalls an interrupt handler's log
//! call.

use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicU64, Ordering};

use hadron_core::log::LogLevel;
use hadron_core::sync::{Futex, IrqSpinLock};
use planck_noalloc::vec::ArrayVec;

use crate::tcb::ThreadId;

/// Maximum formatted message length per record; longer messages are
/// truncated at the byte boundary nearest this limit.
const MAX_MESSAGE_LEN: usize = 120;

/// Maximum number of records the queue holds before producers start
/// dropping instead of blocking.
const QUEUE_CAPACITY: usize = 64;

struct Record {
    level: LogLevel,
    len: u8,
    buf: [u8; MAX_MESSAGE_LEN],
}

impl Record {
    fn as_str(&self) -> &str {
        // SAFETY: `buf[..len]` is only ever filled through `fmt::Write`,
        // which only ever hands us valid UTF-8 fragments.
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.len as usize]) }
    }
}

struct RecordWriter<'a> {
    buf: &'a mut [u8; MAX_MESSAGE_LEN],
    len: usize,
}

impl fmt::Write for RecordWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = MAX_MESSAGE_LEN - self.len;
        let take = remaining.min(s.len());
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

static QUEUE: IrqSpinLock<ArrayVec<Record, QUEUE_CAPACITY>> = IrqSpinLock::new(ArrayVec::new());

/// Signals the drain thread that the queue is non-empty. Purely a wakeup
/// transport, same role as the one embedded in `hadron_core::sync::Mutex`.
static SIGNAL: Futex = Futex::new(0);

static DROPPED: AtomicU64 = AtomicU64::new(0);

/// Number of records dropped so far because the queue was full when they
/// were enqueued.
pub fn dropped_count() -> u64 {
    DROPPED.load(Ordering::Relaxed)
}

fn enqueue(level: LogLevel, args: fmt::Arguments<'_>) {
    let mut buf = [0u8; MAX_MESSAGE_LEN];
    let len = {
        let mut writer = RecordWriter {
            buf: &mut buf,
            len: 0,
        };
        let _ = writer.write_fmt(args);
        writer.len as u8
    };

    let mut queue = QUEUE.lock();
    if queue.try_push(Record { level, len, buf }).is_err() {
        DROPPED.fetch_add(1, Ordering::Relaxed);
        return;
    }
    drop(queue);
    SIGNAL.store(SIGNAL.load().wrapping_add(1));
    SIGNAL.wake(1);
}

/// Registers syslog as the kernel's leveled log sink.
///
/// Call once, early in boot, before anything logs through `klog!` or its
/// `kdebug!`/`kinfo!`/`kwarn!`/`kerror!` convenience macros.
///
/// # Safety
///
/// Same contract as `hadron_core::log::set_log_fn`: must be safe to call
/// from any context, including interrupt handlers.
pub unsafe fn init() {
    unsafe { hadron_core::log::set_log_fn(enqueue) };
}

async fn drain_loop() {
    loop {
        let popped = {
            let mut queue = QUEUE.lock();
            if queue.is_empty() {
                None
            } else {
                Some(queue.swap_remove(0))
            }
        };
        let Some(record) = popped else {
            let seq = SIGNAL.load();
            SIGNAL.wait(seq).await;
            continue;
        };
        hadron_core::kprintln!("[{}] {}", record.level.name(), record.as_str());
    }
}

/// Spawns the dedicated syslog drain thread, pinned to `cpu` at
/// system-critical priority alongside the deferred-IRQ executor.
pub fn spawn_drain_thread(cpu: u32) -> ThreadId {
    crate::sched::spawn(
        "syslog",
        crate::sched::SYSTEM_CRITICAL_PRIORITY,
        1u64 << cpu,
        true,
        drain_loop(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_writer_truncates_overlong_messages() {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let mut writer = RecordWriter {
            buf: &mut buf,
            len: 0,
        };
        let long = "x".repeat(MAX_MESSAGE_LEN + 10);
        let _ = writer.write_str(&long);
        assert_eq!(writer.len, MAX_MESSAGE_LEN);
    }

    #[test]
    fn enqueue_drops_and_counts_past_capacity() {
        QUEUE.lock().clear();
        let before = dropped_count();
        for _ in 0..QUEUE_CAPACITY + 5 {
            enqueue(LogLevel::Info, format_args!("line"));
        }
        assert_eq!(QUEUE.lock().len(), QUEUE_CAPACITY);
        assert_eq!(dropped_count(), before + 5);
        QUEUE.lock().clear();
    }
}
