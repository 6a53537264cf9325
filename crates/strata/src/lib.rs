//! Low-level runtime substrate for the engine: a free-list heap allocator
//! backed by a single anonymous mapping, and blocking synchronization
//! primitives (mutex, semaphore, condition variable, thread) built directly
//! on futex wait/wake syscalls.
//!
//! The heap and the sync primitives are independent of each other; threads
//! use both (their stacks come out of a [`Heap`], their join handshake is a
//! futex word).

pub mod config;
pub mod error;
pub mod heap;
pub mod platform;
pub mod sync;
pub mod thread;
pub mod util;

pub use error::Error;
pub use heap::global::{heap, memory_init, memory_shutdown};
pub use heap::{Heap, HeapConfig, HeapStats, OomPolicy};
pub use sync::condvar::Condvar;
pub use sync::mutex::{Mutex, MutexGuard, RawMutex};
pub use sync::semaphore::Semaphore;
pub use thread::Thread;
