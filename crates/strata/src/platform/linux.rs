use core::ptr;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// Map anonymous read-write memory.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let result = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

/// Unmap memory.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` with the same `size`.
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// Runtime page size, cached after the first sysconf call.
/// Falls back to 4096 if sysconf reports nonsense.
static PAGE_SIZE_CACHED: AtomicUsize = AtomicUsize::new(0);

pub fn page_size() -> usize {
    let cached = PAGE_SIZE_CACHED.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let ps = if ps > 0 { ps as usize } else { 4096 };
    PAGE_SIZE_CACHED.store(ps, Ordering::Relaxed);
    ps
}

/// FUTEX_WAIT: sleep while `*addr == expected`. Returns on wake, on a value
/// mismatch, or spuriously (EINTR).
pub fn futex_wait(addr: &AtomicI32, expected: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicI32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            ptr::null::<libc::timespec>(),
        );
    }
}

pub fn futex_wake_one(addr: &AtomicI32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicI32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1i32,
        );
    }
}

pub fn futex_wake_all(addr: &AtomicI32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicI32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
        );
    }
}

/// Spawn a thread with `clone(2)` on a caller-provided stack.
///
/// `CLONE_PARENT_SETTID` writes the new tid into `tid_slot` before clone
/// returns in the parent; `CLONE_CHILD_CLEARTID` makes the kernel zero the
/// same slot and futex-wake it once the child has fully exited. Waiting for
/// that clear is the only safe point to reclaim the stack.
///
/// # Safety
/// See `platform::spawn_thread`.
pub unsafe fn spawn_thread(
    stack_top: *mut u8,
    trampoline: extern "C" fn(*mut libc::c_void) -> libc::c_int,
    arg: *mut libc::c_void,
    tid_slot: *mut i32,
) -> Result<i32, i32> {
    let flags = libc::CLONE_VM
        | libc::CLONE_FS
        | libc::CLONE_FILES
        | libc::CLONE_SIGHAND
        | libc::CLONE_THREAD
        | libc::CLONE_SYSVSEM
        | libc::CLONE_PARENT_SETTID
        | libc::CLONE_CHILD_CLEARTID;

    let tid = libc::clone(
        trampoline,
        stack_top as *mut libc::c_void,
        flags,
        arg,
        tid_slot,                          // parent_tid
        ptr::null_mut::<libc::c_void>(),   // tls
        tid_slot,                          // child_tid
    );
    if tid == -1 {
        Err(*libc::__errno_location())
    } else {
        Ok(tid)
    }
}

/// Sleep for at least `ms` milliseconds, resuming across EINTR.
pub fn sleep_ms(ms: u64) {
    let mut req = libc::timespec {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_nsec: ((ms % 1000) * 1_000_000) as libc::c_long,
    };
    loop {
        let mut rem = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::nanosleep(&req, &mut rem) };
        if ret == 0 || unsafe { *libc::__errno_location() } != libc::EINTR {
            return;
        }
        req = rem;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_and_unmap_round_trip() {
        unsafe {
            let size = page_size();
            let ptr = map_anonymous(size);
            assert!(!ptr.is_null());
            // The mapping must be writable and readable.
            ptr.write_bytes(0xAB, size);
            assert_eq!(*ptr, 0xAB);
            unmap(ptr, size);
        }
    }

    #[test]
    fn futex_wake_without_waiters_is_harmless() {
        let word = AtomicI32::new(0);
        futex_wake_one(&word);
        futex_wake_all(&word);
    }

    #[test]
    fn futex_wait_returns_on_value_mismatch() {
        let word = AtomicI32::new(7);
        // Expected value differs from the stored one, so the kernel returns
        // immediately with EAGAIN instead of sleeping.
        futex_wait(&word, 3);
    }
}
