use crate::platform;
use crate::sync::mutex::{MutexGuard, RawMutex};
use core::sync::atomic::{AtomicI32, Ordering};

/// A futex-based condition variable.
///
/// Waiters sleep on a dedicated generation counter, not on the mutex's own
/// lock word: the counter is read while the mutex is still held, so a notify
/// that lands between the unlock and the futex sleep changes the word and
/// the sleep returns immediately. No wakeup can be lost.
///
/// Wakeups may still be spurious; use [`Condvar::wait_while`] to retest a
/// predicate, or re-check the condition manually after [`Condvar::wait`].
pub struct Condvar {
    generation: AtomicI32,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            generation: AtomicI32::new(0),
        }
    }

    /// Atomically release the guard's mutex and sleep until notified, then
    /// reacquire the mutex and hand the guard back.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let observed = self.generation.load(Ordering::Relaxed);
        guard.raw().unlock();
        platform::futex_wait(&self.generation, observed);
        guard.raw().lock();
        guard
    }

    /// Sleep until `condition` returns false, retesting after every wakeup.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Raw-lock flavor of [`Condvar::wait`] for callers that manage the
    /// mutex themselves. `mutex` must be locked by the caller.
    pub fn wait_raw(&self, mutex: &RawMutex) {
        let observed = self.generation.load(Ordering::Relaxed);
        mutex.unlock();
        platform::futex_wait(&self.generation, observed);
        mutex.lock();
    }

    /// Wake one waiter.
    pub fn notify_one(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        platform::futex_wake_one(&self.generation);
    }

    /// Wake all waiters.
    pub fn notify_all(&self) {
        self.generation.fetch_add(1, Ordering::Release);
        platform::futex_wake_all(&self.generation);
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
