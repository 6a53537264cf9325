use crate::platform;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, Ordering};

const UNLOCKED: i32 = 0;
const LOCKED: i32 = 1;

/// A futex-based mutex over a single 32-bit state word.
///
/// The lock path is the standard optimistic-CAS / pessimistic-futex-park
/// scheme: one compare-and-swap on the fast path, a futex sleep while the
/// word reads `LOCKED` on the slow path. Unlock wakes every waiter; waking
/// one would be fairer under heavy contention but waking all is the
/// correctness-preserving baseline.
///
/// There are no timeouts and no error reporting. Relocking from the owning
/// thread deadlocks; the mutex does not detect it.
#[derive(Debug)]
pub struct RawMutex {
    state: AtomicI32,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    #[inline]
    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        self.lock_slow();
    }

    #[cold]
    fn lock_slow(&self) {
        loop {
            while self.state.load(Ordering::Relaxed) == LOCKED {
                platform::futex_wait(&self.state, LOCKED);
            }
            if self
                .state
                .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// A single CAS attempt, no blocking. Returns true if the lock was taken.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn unlock(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
        platform::futex_wake_all(&self.state);
    }

    /// Observational only: the answer can be stale the instant it returns.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// A mutex that wraps data, like `std::sync::Mutex` but futex-backed and
/// free of poisoning.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// The raw lock serializes access to `data`, so sharing is sound whenever the
// payload itself may move between threads.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> MutexGuard<'_, T> {
    /// The raw lock backing this guard; used by the condition variable to
    /// release and reacquire around a futex sleep.
    pub(crate) fn raw(&self) -> &RawMutex {
        &self.mutex.raw
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}
