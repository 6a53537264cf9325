//! Threads on bare `clone(2)`, with stacks owned by a [`Heap`].
//!
//! The spawned callable runs on a raw execution context that shares the
//! parent's TLS block: keep callables on substrate primitives, atomics, and
//! plain computation. A panic escaping the callable unwinds into an
//! `extern "C"` frame and aborts the process; there is no panic channel
//! back to the joiner.

use crate::config;
use crate::error::Error;
use crate::heap::{global, Heap};
use crate::platform;
use crate::sync;
use crate::util::{align_up, MIN_ALIGN};
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicI32, Ordering};

/// Control record placement-constructed at the base of the thread's stack
/// block. The closure payload follows it; `invoke` is the monomorphized
/// entry point that moves the closure out and calls it, so the record stays
/// type-erased.
#[repr(C)]
struct Control {
    /// 0 while the callable runs, 1 once it has returned. Futex-woken by
    /// the trampoline.
    finished: AtomicI32,
    /// Thread id, written by the kernel before `clone` returns and zeroed
    /// (with a futex wake) once the thread has fully exited. The stack must
    /// not be reclaimed before that clear.
    tid: AtomicI32,
    invoke: unsafe fn(*mut u8),
}

fn payload_offset<F>() -> usize {
    align_up(mem::size_of::<Control>(), mem::align_of::<F>())
}

unsafe fn invoke_closure<F: FnOnce()>(base: *mut u8) {
    let f = (base.add(payload_offset::<F>()) as *mut F).read();
    f();
}

extern "C" fn trampoline(arg: *mut libc::c_void) -> libc::c_int {
    unsafe {
        let control = arg as *mut Control;
        ((*control).invoke)(arg as *mut u8);
        (*control).finished.store(1, Ordering::Release);
        sync::atomic_notify_all(&(*control).finished);
    }
    0
}

/// A joinable thread whose stack lives in a [`Heap`].
///
/// The thread exclusively owns its stack block and control record until
/// [`Thread::join`] completes; dropping an unjoined thread joins first.
#[derive(Debug)]
pub struct Thread {
    heap: &'static Heap,
    /// Stack block base; null once joined.
    block: *mut u8,
}

// The handle only touches the control record through atomics and releases
// the stack after the kernel's exit signal, so it may move between threads.
unsafe impl Send for Thread {}

impl Thread {
    /// Spawn `f` on the process-wide heap with the configured default stack
    /// size.
    pub fn spawn<F>(f: F) -> Result<Thread, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn_in(global::heap(), f)
    }

    /// Spawn `f` with its stack allocated from `heap`.
    pub fn spawn_in<F>(heap: &'static Heap, f: F) -> Result<Thread, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn_with_stack(heap, config::thread_stack_size(), f)
    }

    /// Spawn `f` with an explicit stack size.
    pub fn spawn_with_stack<F>(
        heap: &'static Heap,
        stack_size: usize,
        f: F,
    ) -> Result<Thread, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let stack_size = align_up(stack_size, MIN_ALIGN);
        let record_end = payload_offset::<F>() + mem::size_of::<F>();
        assert!(
            record_end + 64 * 1024 <= stack_size,
            "stack size {stack_size} leaves no room below the invocation record"
        );

        // The payload offset is a multiple of the closure's alignment, so
        // the placement below stays aligned only if the block base is too.
        let block_align = MIN_ALIGN.max(mem::align_of::<F>());
        let block = heap.allocate_aligned(stack_size, block_align)?.as_ptr();
        unsafe {
            let control = block as *mut Control;
            control.write(Control {
                finished: AtomicI32::new(0),
                tid: AtomicI32::new(0),
                invoke: invoke_closure::<F>,
            });
            let payload = block.add(payload_offset::<F>()) as *mut F;
            debug_assert!(payload as usize % mem::align_of::<F>() == 0);
            payload.write(f);

            let stack_top = block.add(stack_size);
            match platform::spawn_thread(
                stack_top,
                trampoline,
                control as *mut libc::c_void,
                (*control).tid.as_ptr(),
            ) {
                Ok(_) => Ok(Thread { heap, block }),
                Err(errno) => {
                    log::error!("thread creation failed: errno {errno}");
                    ptr::drop_in_place(block.add(payload_offset::<F>()) as *mut F);
                    heap.free_aligned(block);
                    Err(Error::ThreadCreationFailed { errno })
                }
            }
        }
    }

    /// Block until the callable has returned and the thread has fully
    /// exited, then release the stack back to the heap. Idempotent. All of
    /// the thread's side effects are visible after this returns.
    pub fn join(&mut self) {
        if self.block.is_null() {
            return;
        }
        unsafe {
            let control = self.block as *mut Control;
            sync::atomic_wait(&(*control).finished, 0);
            // The callable has returned, but the thread is still unwinding
            // out of the kernel; wait for the child-tid clear before the
            // stack can be reused.
            loop {
                let tid = (*control).tid.load(Ordering::Acquire);
                if tid == 0 {
                    break;
                }
                platform::futex_wait(&(*control).tid, tid);
            }
            self.heap.free_aligned(self.block);
        }
        self.block = ptr::null_mut();
    }

    /// Whether `join` has already completed.
    pub fn is_joined(&self) -> bool {
        self.block.is_null()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_heap() -> &'static Heap {
        Box::leak(Box::new(Heap::new(16 * 1024 * 1024).unwrap()))
    }

    #[test]
    fn spawn_runs_callable_and_join_sees_it() {
        static FLAG: AtomicU32 = AtomicU32::new(0);
        let heap = test_heap();
        let mut t = Thread::spawn_in(heap, || {
            FLAG.store(0xC0FFEE, Ordering::Release);
        })
        .unwrap();
        t.join();
        assert_eq!(FLAG.load(Ordering::Acquire), 0xC0FFEE);
        assert!(t.is_joined());
    }

    #[test]
    fn join_releases_the_stack_block() {
        let heap = test_heap();
        let before = heap.stats().bytes_in_use;
        let mut t = Thread::spawn_in(heap, || {}).unwrap();
        t.join();
        assert_eq!(heap.stats().bytes_in_use, before);
    }

    #[test]
    fn drop_joins_implicitly() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let heap = test_heap();
        {
            let _t = Thread::spawn_in(heap, || {
                COUNTER.fetch_add(1, Ordering::AcqRel);
            })
            .unwrap();
        }
        // The block above cannot exit before the thread ran.
        assert_eq!(COUNTER.load(Ordering::Acquire), 1);
    }

    #[test]
    fn over_aligned_captures_are_placed_at_their_alignment() {
        // An align-64 capture forces the whole invocation record onto a
        // 64-byte boundary; the callable reading it back proves the
        // placement write and the read hit an aligned address.
        #[repr(align(64))]
        #[derive(Clone, Copy)]
        struct Lanes([u8; 64]);

        static SUM: AtomicU32 = AtomicU32::new(0);

        let heap = test_heap();
        let lanes = Lanes([1; 64]);
        for _ in 0..32 {
            let mut t = Thread::spawn_in(heap, move || {
                let total: u32 = lanes.0.iter().map(|&b| b as u32).sum();
                SUM.fetch_add(total, Ordering::AcqRel);
            })
            .unwrap();
            t.join();
        }
        assert_eq!(SUM.load(Ordering::Acquire), 32 * 64);
        assert_eq!(heap.stats().bytes_in_use, 0);
    }

    #[test]
    fn join_is_idempotent() {
        let heap = test_heap();
        let mut t = Thread::spawn_in(heap, || {}).unwrap();
        t.join();
        t.join();
        assert!(t.is_joined());
    }
}
