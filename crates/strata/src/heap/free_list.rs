use crate::platform;
use crate::util::{align_up, MIN_ALIGN};
use core::mem;
use core::ptr;

/// In-place header of a section of arena bytes. Free sections chain through
/// `next` in address order; live allocations keep the same header right
/// before the pointer handed to the caller (`next` unused) so `free` can
/// recover the block size from the pointer alone.
#[repr(C)]
pub(crate) struct Section {
    size: usize,
    next: *mut Section,
}

/// Section header size. Equal to `MIN_ALIGN`, so a header never disturbs
/// the alignment of the bytes that follow it.
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Section>();

// Every section start is 16-aligned by induction from the arena base; that
// only holds while the header itself spans exactly MIN_ALIGN bytes.
const _: () = assert!(HEADER_SIZE == MIN_ALIGN);

/// Size of the back-offset word stored just before an aligned pointer.
const OFFSET_WORD: usize = mem::size_of::<usize>();

/// A free-list allocator over a single anonymous mapping.
///
/// Not synchronized; `Heap` wraps it in a mutex. Invariants: every arena
/// byte is either part of a live block or covered by exactly one free
/// section, sections never overlap, and the list stays sorted by address.
///
/// Fit policy: a fitting section found before the tail is unlinked and
/// handed out whole (no splitting; the block keeps its full size and
/// returns intact on free). Only the tail section is carved, which makes it
/// behave as a bump region once all interior holes are exhausted.
pub(crate) struct FreeList {
    base: *mut u8,
    capacity: usize,
    mapped: usize,
    head: *mut Section,
}

impl FreeList {
    /// Reserve a `capacity`-byte arena. Returns `None` if the OS refuses
    /// the mapping or the capacity cannot hold even one header.
    pub(crate) fn new(capacity: usize) -> Option<FreeList> {
        if capacity <= HEADER_SIZE {
            return None;
        }
        let mapped = align_up(capacity, platform::page_size());
        let base = unsafe { platform::map_anonymous(mapped) };
        if base.is_null() {
            return None;
        }
        let head = base as *mut Section;
        unsafe {
            (*head).size = capacity - HEADER_SIZE;
            (*head).next = ptr::null_mut();
        }
        Some(FreeList {
            base,
            capacity,
            mapped,
            head,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// One-past-the-end of a section's span (header plus payload).
    #[inline]
    unsafe fn section_end(section: *mut Section) -> *mut u8 {
        (section as *mut u8).add(HEADER_SIZE + (*section).size)
    }

    /// Allocate at least `size` bytes, 16-aligned. Returns null when no
    /// section and no tail capacity suffice.
    pub(crate) fn allocate(&mut self, size: usize) -> *mut u8 {
        // Rounding up must not wrap, and nothing bigger than the arena can
        // ever fit. Near-usize::MAX requests fail here instead of aliasing
        // a tiny block.
        let size = match size.max(1).checked_add(MIN_ALIGN - 1) {
            Some(rounded) => rounded & !(MIN_ALIGN - 1),
            None => return ptr::null_mut(),
        };
        if size > self.capacity || self.head.is_null() {
            return ptr::null_mut();
        }

        unsafe {
            let mut prev: *mut Section = ptr::null_mut();
            let mut current = self.head;
            while (*current).size < size && !(*current).next.is_null() {
                prev = current;
                current = (*current).next;
            }
            if (*current).size < size {
                return ptr::null_mut();
            }

            if (*current).next.is_null() {
                // Tail section: carve off the front, keep the remainder as
                // the new tail.
                if (*current).size >= size + HEADER_SIZE {
                    let new_tail =
                        (current as *mut u8).add(HEADER_SIZE + size) as *mut Section;
                    (*new_tail).size = (*current).size - size - HEADER_SIZE;
                    (*new_tail).next = ptr::null_mut();
                    if prev.is_null() {
                        self.head = new_tail;
                    } else {
                        (*prev).next = new_tail;
                    }
                    (*current).size = size;
                } else {
                    // Remainder cannot hold a header; hand out the whole tail.
                    if prev.is_null() {
                        self.head = ptr::null_mut();
                    } else {
                        (*prev).next = ptr::null_mut();
                    }
                }
            } else {
                // Interior fit: unlink the whole section.
                if prev.is_null() {
                    self.head = (*current).next;
                } else {
                    (*prev).next = (*current).next;
                }
            }

            (*current).next = ptr::null_mut();
            (current as *mut u8).add(HEADER_SIZE)
        }
    }

    /// Return a block to the free list, keeping the list address-ordered and
    /// coalescing with whichever neighbors are contiguous.
    ///
    /// # Safety
    /// `ptr` must have come from `allocate` on this list and not been freed
    /// since.
    pub(crate) unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let block = ptr.sub(HEADER_SIZE) as *mut Section;
        debug_assert!(block as *mut u8 >= self.base);
        debug_assert!(Self::section_end(block) <= self.base.add(self.capacity));

        if self.head.is_null() {
            (*block).next = ptr::null_mut();
            self.head = block;
            return;
        }

        if block < self.head {
            if Self::section_end(block) == self.head as *mut u8 {
                (*block).size += HEADER_SIZE + (*self.head).size;
                (*block).next = (*self.head).next;
            } else {
                (*block).next = self.head;
            }
            self.head = block;
            return;
        }

        // Find the last section below the freed block.
        let mut prev = self.head;
        while !(*prev).next.is_null() && (*prev).next < block {
            prev = (*prev).next;
        }
        let next = (*prev).next;

        if Self::section_end(prev) == block as *mut u8 {
            // Merge into the predecessor.
            (*prev).size += HEADER_SIZE + (*block).size;
            if !next.is_null() && Self::section_end(prev) == next as *mut u8 {
                (*prev).size += HEADER_SIZE + (*next).size;
                (*prev).next = (*next).next;
            }
        } else {
            (*block).next = next;
            (*prev).next = block;
            if !next.is_null() && Self::section_end(block) == next as *mut u8 {
                (*block).size += HEADER_SIZE + (*next).size;
                (*block).next = (*next).next;
            }
        }
    }

    /// Allocate with a power-of-two alignment. Over-allocates by
    /// `align + OFFSET_WORD` and records the distance back to the raw block
    /// in the word just before the returned pointer.
    pub(crate) fn allocate_aligned(&mut self, size: usize, align: usize) -> *mut u8 {
        debug_assert!(align.is_power_of_two());
        // The allocator hands out 16-aligned blocks anyway; smaller
        // requests collapse onto that.
        let align = align.max(MIN_ALIGN);

        let total = match size
            .checked_add(align)
            .and_then(|t| t.checked_add(OFFSET_WORD))
        {
            Some(total) => total,
            None => return ptr::null_mut(),
        };
        let raw = self.allocate(total);
        if raw.is_null() {
            return ptr::null_mut();
        }

        let raw_addr = raw as usize;
        let aligned = align_up(raw_addr + OFFSET_WORD, align);
        unsafe {
            ((aligned - OFFSET_WORD) as *mut usize).write(aligned - raw_addr);
        }
        aligned as *mut u8
    }

    /// Free an `allocate_aligned` pointer.
    ///
    /// # Safety
    /// `ptr` must have come from `allocate_aligned` on this list and not
    /// been freed since.
    pub(crate) unsafe fn free_aligned(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let offset = ((ptr as usize - OFFSET_WORD) as *const usize).read();
        self.free(ptr.sub(offset));
    }

    /// Allocate a new block, copy over the old contents, free the old
    /// block. No in-place growth. A null `ptr` is a plain allocation.
    ///
    /// # Safety
    /// `ptr` must be null or a live `allocate` pointer from this list.
    pub(crate) unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        let new_ptr = self.allocate(new_size);
        if new_ptr.is_null() {
            return ptr::null_mut();
        }
        let old_size = self.block_size(ptr);
        ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
        self.free(ptr);
        new_ptr
    }

    /// Aligned flavor of `reallocate`.
    ///
    /// # Safety
    /// `ptr` must be null or a live `allocate_aligned` pointer from this
    /// list.
    pub(crate) unsafe fn reallocate_aligned(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
        align: usize,
    ) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate_aligned(new_size, align);
        }
        let new_ptr = self.allocate_aligned(new_size, align);
        if new_ptr.is_null() {
            return ptr::null_mut();
        }
        let old_usable = self.aligned_usable_size(ptr);
        ptr::copy_nonoverlapping(ptr, new_ptr, old_usable.min(new_size));
        self.free_aligned(ptr);
        new_ptr
    }

    /// Payload size of a live block (the rounded-up allocation size, or the
    /// whole span of a recycled section).
    ///
    /// # Safety
    /// `ptr` must be a live `allocate` pointer from this list.
    pub(crate) unsafe fn block_size(&self, ptr: *mut u8) -> usize {
        (*(ptr.sub(HEADER_SIZE) as *const Section)).size
    }

    /// Usable bytes behind an aligned pointer (raw block size minus the
    /// alignment gap).
    ///
    /// # Safety
    /// `ptr` must be a live `allocate_aligned` pointer from this list.
    pub(crate) unsafe fn aligned_usable_size(&self, ptr: *mut u8) -> usize {
        let offset = ((ptr as usize - OFFSET_WORD) as *const usize).read();
        let raw = ptr.sub(offset);
        self.block_size(raw) - offset
    }

    /// Raw block size behind an aligned pointer, for byte accounting.
    ///
    /// # Safety
    /// `ptr` must be a live `allocate_aligned` pointer from this list.
    pub(crate) unsafe fn aligned_block_size(&self, ptr: *mut u8) -> usize {
        let offset = ((ptr as usize - OFFSET_WORD) as *const usize).read();
        self.block_size(ptr.sub(offset))
    }
}

impl Drop for FreeList {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                platform::unmap(self.base, self.mapped);
            }
        }
    }
}
