//! Counting semaphore, optionally capped to a binary (0/1) semaphore.
//!
//! Modeled as a signed level: [`Semaphore::acquire`] decrements it and
//! blocks whenever the result goes negative, [`SemaphorePermit::drop`]
//! increments it back and wakes one blocked waiter if the level crossed
//! back above zero. The level itself is the resource count; an embedded
//! [`Futex`] is purely the wait/wake transport, the same one
//! [`super::Mutex`] uses.

use core::future::Future;
use core::ops::Deref;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use core::task::{Context, Poll};

use super::futex::{Futex, FutexWaitFuture};

/// Errors returned by [`Semaphore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    /// The semaphore has been destroyed.
    Destroyed,
    /// The requested operation would push the level out of its valid range
    /// (e.g. posting past the binary cap).
    IncorrectValue,
}

bitflags::bitflags! {
    /// Behavioral flags for a [`Semaphore`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SemaphoreFlags: u32 {
        /// Caps the level to at most 1, turning this into a binary semaphore.
        const BINARY = 1 << 0;
    }
}

/// A counting semaphore.
pub struct Semaphore {
    level: AtomicI32,
    max: i32,
    alive: AtomicBool,
    futex: Futex,
}

impl Semaphore {
    /// Creates a semaphore with `initial` available permits.
    pub const fn new(initial: i32) -> Self {
        Self::with_flags(initial, SemaphoreFlags::empty())
    }

    /// Creates a semaphore with `initial` permits and the given [`SemaphoreFlags`].
    pub const fn with_flags(initial: i32, flags: SemaphoreFlags) -> Self {
        let max = if flags.contains(SemaphoreFlags::BINARY) {
            1
        } else {
            i32::MAX
        };
        Self {
            level: AtomicI32::new(initial),
            max,
            alive: AtomicBool::new(true),
            futex: Futex::new(0),
        }
    }

    /// Attempts to acquire a permit without blocking.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        if !self.alive.load(Ordering::Acquire) {
            return None;
        }
        let mut current = self.level.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return None;
            }
            match self.level.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(SemaphorePermit { semaphore: self }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Acquires a permit, yielding the calling task while none are available.
    pub fn acquire(&self) -> SemaphoreAcquireFuture<'_> {
        SemaphoreAcquireFuture {
            semaphore: self,
            decremented: false,
            wait: None,
        }
    }

    /// Releases one permit, capped at this semaphore's maximum (`1` for a
    /// binary semaphore, [`i32::MAX`] otherwise), and wakes one waiter if
    /// the level crosses back above zero.
    pub fn post(&self) -> Result<(), SemaphoreError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(SemaphoreError::Destroyed);
        }
        let mut current = self.level.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return Err(SemaphoreError::IncorrectValue);
            }
            match self.level.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) if previous < 0 => {
                    self.wake_one();
                    return Ok(());
                }
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Marks the semaphore destroyed: the level is raised to its maximum
    /// and every waiter is woken. Further [`Semaphore::post`] or
    /// [`Semaphore::acquire`] calls fail with [`SemaphoreError::Destroyed`].
    pub fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
        self.level.store(self.max, Ordering::Release);
        self.futex.destroy();
    }

    fn wake_one(&self) {
        self.futex.store(self.futex.load().wrapping_add(1));
        self.futex.wake(1);
    }
}

/// RAII permit returned by [`Semaphore::acquire`]/[`Semaphore::try_acquire`].
///
/// Dropping it calls [`Semaphore::post`], returning the permit.
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        let _ = self.semaphore.post();
    }
}

impl Deref for SemaphorePermit<'_> {
    type Target = Semaphore;
    fn deref(&self) -> &Semaphore {
        self.semaphore
    }
}

/// Future returned by [`Semaphore::acquire`].
pub struct SemaphoreAcquireFuture<'a> {
    semaphore: &'a Semaphore,
    decremented: bool,
    wait: Option<FutexWaitFuture<'a>>,
}

impl<'a> Future for SemaphoreAcquireFuture<'a> {
    type Output = SemaphorePermit<'a>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            if let Some(wait) = self.wait.as_mut() {
                match Pin::new(wait).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(_) => self.wait = None,
                }
            }

            if !self.decremented {
                self.decremented = true;
                let previous = self.semaphore.level.fetch_sub(1, Ordering::AcqRel);
                if previous > 0 {
                    return Poll::Ready(SemaphorePermit {
                        semaphore: self.semaphore,
                    });
                }
            } else if self.semaphore.level.load(Ordering::Acquire) > 0 {
                // A poster incremented the level; try to claim the permit we
                // already reserved by decrementing above.
                return Poll::Ready(SemaphorePermit {
                    semaphore: self.semaphore,
                });
            }

            let seq = self.semaphore.futex.load();
            self.wait = Some(self.semaphore.futex.wait(seq));
            match Pin::new(self.wait.as_mut().expect("just assigned")).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(_) => self.wait = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::noop_waker;

    #[test]
    fn try_acquire_succeeds_with_permits() {
        let sem = Semaphore::new(1);
        let permit = sem.try_acquire().unwrap();
        assert!(sem.try_acquire().is_none());
        drop(permit);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn post_beyond_binary_cap_is_rejected() {
        let sem = Semaphore::with_flags(1, SemaphoreFlags::BINARY);
        assert_eq!(sem.post(), Err(SemaphoreError::IncorrectValue));
    }

    #[test]
    fn acquire_future_blocks_when_empty_then_resolves() {
        let sem = Semaphore::new(0);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(sem.acquire());
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        sem.post().unwrap();
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(_permit) => {}
            Poll::Pending => panic!("expected the waiter to acquire after post"),
        }
    }

    #[test]
    fn destroy_wakes_waiters_and_rejects_further_posts() {
        let sem = Semaphore::new(0);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(sem.acquire());
        assert!(fut.as_mut().poll(&mut cx).is_pending());

        sem.destroy();
        assert_eq!(sem.post(), Err(SemaphoreError::Destroyed));
    }
}
