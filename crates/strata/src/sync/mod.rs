//! Blocking synchronization primitives built on futex wait/wake.
//!
//! All suspension points in the substrate route through [`atomic_wait`];
//! everything else is plain atomics.

pub mod condvar;
pub mod mutex;
pub mod semaphore;

use crate::platform;
use core::sync::atomic::{AtomicI32, Ordering};

/// Block while `*addr == expected`. Re-checks the word after every wakeup,
/// so spurious wakes never leak out to the caller.
pub fn atomic_wait(addr: &AtomicI32, expected: i32) {
    while addr.load(Ordering::Acquire) == expected {
        platform::futex_wait(addr, expected);
    }
}

/// Wake at most one thread blocked in [`atomic_wait`] on `addr`.
#[inline]
pub fn atomic_notify_one(addr: &AtomicI32) {
    platform::futex_wake_one(addr);
}

/// Wake all threads blocked in [`atomic_wait`] on `addr`.
#[inline]
pub fn atomic_notify_all(addr: &AtomicI32) {
    platform::futex_wake_all(addr);
}
