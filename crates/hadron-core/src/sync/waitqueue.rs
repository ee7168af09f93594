//! Fixed-capacity wait queue usable before any allocator exists.
//!
//! Backs the frame-layer primitives ([`Mutex`](super::Mutex),
//! [`Semaphore`](super::Semaphore), [`Futex`](super::Futex)) each of which
//! keep their own inline queue; this type is for callers that just need a
//! bare queue of the same shape without rolling their own. For unbounded
//! capacity once the heap is up, use [`HeapWaitQueue`](super::HeapWaitQueue).

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use planck_noalloc::vec::ArrayVec;

use super::IrqSpinLock;

/// Fixed number of tasks that may simultaneously queue on one [`WaitQueue`].
const MAX_WAITERS: usize = 32;

/// Fixed-capacity FIFO queue of parked tasks.
pub struct WaitQueue {
    waiters: IrqSpinLock<ArrayVec<Waker, MAX_WAITERS>>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self {
            waiters: IrqSpinLock::new(ArrayVec::new()),
        }
    }

    /// Returns a future that completes the next time this queue is woken.
    pub fn wait(&self) -> WaitQueueFuture<'_> {
        WaitQueueFuture {
            queue: self,
            registered: false,
        }
    }

    /// Registers a waker directly, without constructing a future.
    ///
    /// Returns `false` if the queue is full and the registration was
    /// dropped; callers that cannot tolerate a missed wakeup should retry.
    pub fn register_waker(&self, waker: &Waker) -> bool {
        let mut waiters = self.waiters.lock();
        if waiters.len() >= MAX_WAITERS {
            return false;
        }
        waiters.push(waker.clone());
        true
    }

    /// Wakes the oldest waiting task, if any.
    pub fn wake_one(&self) {
        let woken = {
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                None
            } else {
                Some(waiters.remove(0))
            }
        };
        if let Some(waker) = woken {
            waker.wake();
        }
    }

    /// Wakes every waiting task.
    pub fn wake_all(&self) {
        let mut waiters = self.waiters.lock();
        while let Some(waker) = waiters.pop() {
            waker.wake();
        }
    }

    /// Returns the number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Returns `true` if no task is currently queued.
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`WaitQueue::wait`].
pub struct WaitQueueFuture<'a> {
    queue: &'a WaitQueue,
    registered: bool,
}

impl Future for WaitQueueFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            return Poll::Ready(());
        }
        self.registered = true;
        self.queue.register_waker(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::noop_waker;

    #[test]
    fn wake_one_resolves_a_single_waiter() {
        let queue = WaitQueue::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut a = core::pin::pin!(queue.wait());
        let mut b = core::pin::pin!(queue.wait());
        assert!(a.as_mut().poll(&mut cx).is_pending());
        assert!(b.as_mut().poll(&mut cx).is_pending());
        assert_eq!(queue.len(), 2);

        queue.wake_one();
        assert_eq!(queue.len(), 1);
        assert!(a.as_mut().poll(&mut cx).is_ready());
    }

    #[test]
    fn wake_all_drains_the_queue() {
        let queue = WaitQueue::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut a = core::pin::pin!(queue.wait());
        assert!(a.as_mut().poll(&mut cx).is_pending());

        queue.wake_all();
        assert!(queue.is_empty());
        assert!(a.as_mut().poll(&mut cx).is_ready());
    }
}
