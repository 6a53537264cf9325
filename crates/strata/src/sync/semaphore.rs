use crate::platform;
use core::sync::atomic::{AtomicI32, Ordering};

/// A counting semaphore over a signed 32-bit permit counter.
///
/// `acquire` futex-parks while no permits are available and CAS-decrements
/// once one appears; `release` increments and wakes everyone. There is no
/// waiter queue, so FIFO ordering is not guaranteed: any parked thread may
/// win the race for a fresh permit.
pub struct Semaphore {
    count: AtomicI32,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits.
    pub const fn new(permits: i32) -> Self {
        Self {
            count: AtomicI32::new(permits),
        }
    }

    /// Take one permit, blocking until one is available.
    pub fn acquire(&self) {
        loop {
            let current = self.count.load(Ordering::Relaxed);
            if current > 0 {
                if self
                    .count
                    .compare_exchange(
                        current,
                        current - 1,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return;
                }
                // Lost the race, re-read and retry.
                continue;
            }
            platform::futex_wait(&self.count, current);
        }
    }

    /// Take one permit without blocking. Returns true on success.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.count.load(Ordering::Relaxed);
        while current > 0 {
            match self.count.compare_exchange(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Return one permit and wake all parked waiters.
    pub fn release(&self) {
        self.count.fetch_add(1, Ordering::Release);
        platform::futex_wake_all(&self.count);
    }

    /// Observational snapshot of the permit counter.
    pub fn available(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_single_thread() {
        let s = Semaphore::new(2);
        s.acquire();
        s.acquire();
        assert_eq!(s.available(), 0);
        assert!(!s.try_acquire());
        s.release();
        assert!(s.try_acquire());
        s.release();
        s.release();
        assert_eq!(s.available(), 2);
    }

    #[test]
    fn zero_permit_semaphore_blocks_until_release() {
        let s = std::sync::Arc::new(Semaphore::new(0));
        let s2 = s.clone();
        let h = std::thread::spawn(move || {
            s2.acquire();
        });
        // Give the waiter a moment to park, then let it through.
        platform::sleep_ms(20);
        s.release();
        h.join().unwrap();
        assert_eq!(s.available(), 0);
    }
}
