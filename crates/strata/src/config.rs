use crate::util::DEFAULT_STACK_SIZE;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

/// Cached config values, read from the environment once on first use.
static THREAD_STACK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_STACK_SIZE);
static READ_ONCE: Once = Once::new();

fn read_config() {
    READ_ONCE.call_once(|| {
        if let Some(val) = env_usize("STRATA_THREAD_STACK_SIZE") {
            // Stacks need room for the control record and must keep the
            // stack top 16-aligned; clamp to a sane floor.
            let val = val.max(64 * 1024) & !(crate::util::MIN_ALIGN - 1);
            THREAD_STACK_SIZE.store(val, Ordering::Relaxed);
        }
    });
}

/// Stack size used by `Thread::spawn` when no explicit size is given.
pub fn thread_stack_size() -> usize {
    read_config();
    THREAD_STACK_SIZE.load(Ordering::Relaxed)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}
