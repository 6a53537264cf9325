//! Thin portable wrappers over the OS primitive layer.
//!
//! The substrate needs exactly this much from the platform: anonymous memory
//! mappings, futex-style wait/wake on a 32-bit word, a clone-style thread
//! creation call, and a sleep. Everything above this module is
//! platform-neutral.

use core::sync::atomic::AtomicI32;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

/// Map anonymous read-write memory. Returns null on failure.
///
/// # Safety
/// Caller must ensure `size` is page-aligned and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Unmap previously mapped memory.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` and `size` must match.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// Get the system page size.
#[inline]
pub fn page_size() -> usize {
    sys::page_size()
}

/// Block until the futex word is woken, changes away from `expected`, or a
/// spurious wakeup occurs. Callers must re-check their condition.
#[inline]
pub fn futex_wait(addr: &AtomicI32, expected: i32) {
    sys::futex_wait(addr, expected);
}

/// Wake at most one waiter blocked on `addr`.
#[inline]
pub fn futex_wake_one(addr: &AtomicI32) {
    sys::futex_wake_one(addr);
}

/// Wake all waiters blocked on `addr`.
#[inline]
pub fn futex_wake_all(addr: &AtomicI32) {
    sys::futex_wake_all(addr);
}

/// Create a new execution context running `trampoline(arg)` on the given
/// stack. `tid_slot` receives the new thread id before this returns and is
/// zeroed (with a futex wake) by the kernel once the thread has fully
/// exited; the stack must stay alive until that clear.
///
/// # Safety
/// `stack_top` must point one-past-the-end of a writable, 16-aligned stack
/// region that outlives the thread. `arg` must be valid for the lifetime of
/// the thread. `tid_slot` must be valid until the kernel clears it.
pub unsafe fn spawn_thread(
    stack_top: *mut u8,
    trampoline: extern "C" fn(*mut libc::c_void) -> libc::c_int,
    arg: *mut libc::c_void,
    tid_slot: *mut i32,
) -> Result<i32, i32> {
    sys::spawn_thread(stack_top, trampoline, arg, tid_slot)
}

/// Sleep the calling thread for at least `ms` milliseconds.
#[inline]
pub fn sleep_ms(ms: u64) {
    sys::sleep_ms(ms);
}
