//! The process-wide heap instance. Engine code that does not carry an
//! explicit heap reference routes through this one; it is initialized once
//! at startup and torn down once at shutdown.

use crate::error::Error;
use crate::heap::{Heap, HeapConfig};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNINIT);

struct HeapHolder(UnsafeCell<Option<Heap>>);

// The state machine guarantees the cell is only written during the
// exclusive UNINIT -> INITIALIZING window.
unsafe impl Sync for HeapHolder {}

static GLOBAL: HeapHolder = HeapHolder(UnsafeCell::new(None));

/// Initialize the process-wide heap. Call once at startup, before anything
/// allocates through [`heap`].
///
/// # Panics
/// Panics if the global heap is already initialized (or mid-initialization
/// on another thread); init is a once-per-process event, not a rendezvous.
pub fn memory_init(config: HeapConfig) -> Result<(), Error> {
    if STATE
        .compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        panic!("memory_init called more than once");
    }

    match Heap::with_config(config) {
        Ok(heap) => {
            unsafe {
                *GLOBAL.0.get() = Some(heap);
            }
            STATE.store(READY, Ordering::Release);
            log::debug!("global heap initialized: {} bytes", config.capacity);
            Ok(())
        }
        Err(err) => {
            STATE.store(UNINIT, Ordering::Release);
            Err(err)
        }
    }
}

/// Tear down the process-wide heap, releasing the arena back to the OS.
/// A no-op when nothing is initialized. All pointers from the global heap
/// and all threads spawned on it must be dead by now.
pub fn memory_shutdown() {
    if STATE
        .compare_exchange(READY, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    unsafe {
        *GLOBAL.0.get() = None;
    }
    STATE.store(UNINIT, Ordering::Release);
    log::debug!("global heap shut down");
}

/// The process-wide heap.
///
/// # Panics
/// Panics if [`memory_init`] has not run.
pub fn heap() -> &'static Heap {
    assert_eq!(
        STATE.load(Ordering::Acquire),
        READY,
        "global heap is not initialized; call memory_init first"
    );
    unsafe {
        (*GLOBAL.0.get())
            .as_ref()
            .expect("global heap state is READY but the slot is empty")
    }
}
