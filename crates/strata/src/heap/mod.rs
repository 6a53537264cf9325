//! The arena heap: a free-list allocator over one anonymous mapping,
//! wrapped in a futex mutex so concurrent `allocate`/`free` cannot corrupt
//! the list.

pub mod global;
mod free_list;

use self::free_list::FreeList;
use crate::error::Error;
use crate::sync::mutex::RawMutex;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// What to do when the arena cannot satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OomPolicy {
    /// Surface `Error::MemoryAllocationFailed` to the caller.
    #[default]
    ReturnError,
    /// Log and abort the process. Matches the assert-and-crash behavior of
    /// strict builds.
    Abort,
}

/// Construction parameters for a [`Heap`].
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Usable arena capacity in bytes.
    pub capacity: usize,
    /// Exhaustion policy.
    pub oom_policy: OomPolicy,
}

impl HeapConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            oom_policy: OomPolicy::ReturnError,
        }
    }
}

/// Snapshot of a heap's allocation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    /// Total number of successful allocations.
    pub allocations: u64,
    /// Total number of frees.
    pub frees: u64,
    /// Bytes currently handed out (block payload sizes, headers excluded).
    pub bytes_in_use: usize,
}

/// A general-purpose allocator over a single fixed-capacity arena.
///
/// Internally synchronized: the free list is only ever touched with the
/// heap's mutex held, so any number of threads may allocate and free
/// concurrently. The arena never grows; exhaustion is handled per the
/// configured [`OomPolicy`].
#[derive(Debug)]
pub struct Heap {
    lock: RawMutex,
    inner: UnsafeCell<FreeList>,
    policy: OomPolicy,
    allocations: AtomicU64,
    frees: AtomicU64,
    bytes_in_use: AtomicUsize,
}

// All free-list access goes through `lock`; the counters are atomics.
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    /// Reserve a `capacity`-byte arena with the default (result-returning)
    /// exhaustion policy.
    pub fn new(capacity: usize) -> Result<Heap, Error> {
        Self::with_config(HeapConfig::new(capacity))
    }

    pub fn with_config(config: HeapConfig) -> Result<Heap, Error> {
        let inner = FreeList::new(config.capacity).ok_or(Error::MemoryAllocationFailed {
            requested: config.capacity,
        })?;
        log::debug!("heap arena reserved: {} bytes", config.capacity);
        Ok(Heap {
            lock: RawMutex::new(),
            inner: UnsafeCell::new(inner),
            policy: config.oom_policy,
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            bytes_in_use: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.lock.lock();
        let capacity = unsafe { (*self.inner.get()).capacity() };
        self.lock.unlock();
        capacity
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut FreeList) -> R) -> R {
        self.lock.lock();
        let result = f(unsafe { &mut *self.inner.get() });
        self.lock.unlock();
        result
    }

    fn fail(&self, requested: usize) -> Error {
        let err = Error::MemoryAllocationFailed { requested };
        if self.policy == OomPolicy::Abort {
            log::error!("{err}; aborting per OomPolicy::Abort");
            std::process::abort();
        }
        err
    }

    fn record_alloc(&self, payload: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_add(payload, Ordering::Relaxed);
    }

    fn record_free(&self, payload: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_sub(payload, Ordering::Relaxed);
    }

    /// Allocate at least `size` bytes, 16-aligned.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        let (ptr, payload) = self.with_inner(|inner| {
            let ptr = inner.allocate(size);
            if ptr.is_null() {
                (ptr, 0)
            } else {
                (ptr, unsafe { inner.block_size(ptr) })
            }
        });
        match NonNull::new(ptr) {
            Some(nn) => {
                self.record_alloc(payload);
                Ok(nn)
            }
            None => Err(self.fail(size)),
        }
    }

    /// Allocate at least `size` bytes at a power-of-two `align`.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> Result<NonNull<u8>, Error> {
        let (ptr, payload) = self.with_inner(|inner| {
            let ptr = inner.allocate_aligned(size, align);
            if ptr.is_null() {
                (ptr, 0)
            } else {
                (ptr, unsafe { inner.aligned_block_size(ptr) })
            }
        });
        match NonNull::new(ptr) {
            Some(nn) => {
                self.record_alloc(payload);
                Ok(nn)
            }
            None => Err(self.fail(size)),
        }
    }

    /// Return a block to the arena. Null is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or have come from [`Heap::allocate`] /
    /// [`Heap::reallocate`] on this heap and not been freed since. Using the
    /// pointer after this call is undefined behavior.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let payload = self.with_inner(|inner| {
            let payload = inner.block_size(ptr);
            inner.free(ptr);
            payload
        });
        self.record_free(payload);
    }

    /// Return an aligned block to the arena. Null is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or have come from [`Heap::allocate_aligned`] /
    /// [`Heap::reallocate_aligned`] on this heap and not been freed since.
    pub unsafe fn free_aligned(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let payload = self.with_inner(|inner| {
            let payload = inner.aligned_block_size(ptr);
            inner.free_aligned(ptr);
            payload
        });
        self.record_free(payload);
    }

    /// Move a block to a new allocation of `new_size` bytes, copying the
    /// overlapping prefix. The old block stays live if the new allocation
    /// fails.
    ///
    /// # Safety
    /// `ptr` must be null or a live [`Heap::allocate`] pointer from this
    /// heap.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> Result<NonNull<u8>, Error> {
        let (new_ptr, new_payload, old_payload) = self.with_inner(|inner| {
            let old_payload = if ptr.is_null() {
                0
            } else {
                inner.block_size(ptr)
            };
            let new_ptr = inner.reallocate(ptr, new_size);
            if new_ptr.is_null() {
                (new_ptr, 0, 0)
            } else {
                (new_ptr, inner.block_size(new_ptr), old_payload)
            }
        });
        match NonNull::new(new_ptr) {
            Some(nn) => {
                self.record_alloc(new_payload);
                if !ptr.is_null() {
                    self.record_free(old_payload);
                }
                Ok(nn)
            }
            None => Err(self.fail(new_size)),
        }
    }

    /// Aligned flavor of [`Heap::reallocate`].
    ///
    /// # Safety
    /// `ptr` must be null or a live [`Heap::allocate_aligned`] pointer from
    /// this heap.
    pub unsafe fn reallocate_aligned(
        &self,
        ptr: *mut u8,
        new_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, Error> {
        let (new_ptr, new_payload, old_payload) = self.with_inner(|inner| {
            let old_payload = if ptr.is_null() {
                0
            } else {
                inner.aligned_block_size(ptr)
            };
            let new_ptr = inner.reallocate_aligned(ptr, new_size, align);
            if new_ptr.is_null() {
                (new_ptr, 0, 0)
            } else {
                (new_ptr, inner.aligned_block_size(new_ptr), old_payload)
            }
        });
        match NonNull::new(new_ptr) {
            Some(nn) => {
                self.record_alloc(new_payload);
                if !ptr.is_null() {
                    self.record_free(old_payload);
                }
                Ok(nn)
            }
            None => Err(self.fail(new_size)),
        }
    }

    /// Snapshot the allocation counters.
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
        }
    }
}
