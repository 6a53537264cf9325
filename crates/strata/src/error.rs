use thiserror::Error;

/// Errors surfaced by the substrate. Synchronization primitives never fail
/// at the API level; only memory reservation/exhaustion and thread creation
/// are fallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The arena could not satisfy the request, or the OS refused the
    /// initial reservation.
    #[error("memory allocation failed: {requested} bytes requested")]
    MemoryAllocationFailed { requested: usize },

    /// `clone(2)` refused to create a new execution context.
    #[error("thread creation failed: errno {errno}")]
    ThreadCreationFailed { errno: i32 },
}
