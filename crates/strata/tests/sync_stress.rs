//! Contention tests for the futex primitives, driven by substrate threads
//! (stacks from a substrate heap, join via futex).
//!
//! Callables run on bare clone(2) contexts, so they stay on atomics and
//! substrate primitives: no allocation, no panicking asserts inside the
//! threads. Results are collected in statics and checked after join.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use strata::{Condvar, Heap, Mutex, Semaphore, Thread};

fn leaked_heap() -> &'static Heap {
    let _ = env_logger::builder().is_test(true).try_init();
    Box::leak(Box::new(Heap::new(64 * 1024 * 1024).unwrap()))
}

// ---------------------------------------------------------------------------
// Mutual exclusion: N threads x M guarded increments == N*M
// ---------------------------------------------------------------------------

#[test]
fn mutex_guards_a_shared_counter() {
    const THREADS: usize = 4;
    const INCREMENTS: u64 = 100_000;

    let heap = leaked_heap();
    let counter: &'static Mutex<u64> = Box::leak(Box::new(Mutex::new(0)));

    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            Thread::spawn_in(heap, move || {
                for _ in 0..INCREMENTS {
                    *counter.lock() += 1;
                }
            })
            .unwrap()
        })
        .collect();

    for mut t in threads {
        t.join();
    }
    assert_eq!(*counter.lock(), THREADS as u64 * INCREMENTS);
    assert!(!counter.is_locked());
}

#[test]
fn try_lock_never_double_admits() {
    const THREADS: usize = 4;
    const ATTEMPTS: u32 = 50_000;

    static INSIDE: AtomicU32 = AtomicU32::new(0);
    static COLLISIONS: AtomicU32 = AtomicU32::new(0);
    static ACQUIRED: AtomicU32 = AtomicU32::new(0);

    let heap = leaked_heap();
    let lock: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));

    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            Thread::spawn_in(heap, move || {
                for _ in 0..ATTEMPTS {
                    if let Some(_guard) = lock.try_lock() {
                        if INSIDE.fetch_add(1, Ordering::AcqRel) != 0 {
                            COLLISIONS.fetch_add(1, Ordering::Relaxed);
                        }
                        INSIDE.fetch_sub(1, Ordering::AcqRel);
                        ACQUIRED.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
            .unwrap()
        })
        .collect();

    for mut t in threads {
        t.join();
    }
    assert_eq!(COLLISIONS.load(Ordering::Acquire), 0);
    assert!(ACQUIRED.load(Ordering::Acquire) > 0);
}

// ---------------------------------------------------------------------------
// Semaphore bound: never more than K concurrent holders
// ---------------------------------------------------------------------------

#[test]
fn semaphore_never_exceeds_its_permit_count() {
    const PERMITS: i32 = 3;
    const THREADS: usize = 8;
    const ROUNDS: u32 = 2_000;

    static IN_FLIGHT: AtomicI32 = AtomicI32::new(0);
    static MAX_SEEN: AtomicI32 = AtomicI32::new(0);

    let heap = leaked_heap();
    let sem: &'static Semaphore = Box::leak(Box::new(Semaphore::new(PERMITS)));

    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            Thread::spawn_in(heap, move || {
                for _ in 0..ROUNDS {
                    sem.acquire();
                    let now = IN_FLIGHT.fetch_add(1, Ordering::AcqRel) + 1;
                    MAX_SEEN.fetch_max(now, Ordering::AcqRel);
                    IN_FLIGHT.fetch_sub(1, Ordering::AcqRel);
                    sem.release();
                }
            })
            .unwrap()
        })
        .collect();

    for mut t in threads {
        t.join();
    }
    let max = MAX_SEEN.load(Ordering::Acquire);
    assert!(max <= PERMITS, "saw {max} concurrent holders, permits {PERMITS}");
    assert!(max > 0);
    assert_eq!(sem.available(), PERMITS);
}

#[test]
fn semaphore_signals_from_worker_to_main() {
    const SIGNALS: u32 = 64;

    let heap = leaked_heap();
    let sem: &'static Semaphore = Box::leak(Box::new(Semaphore::new(0)));

    let mut producer = Thread::spawn_in(heap, move || {
        for _ in 0..SIGNALS {
            sem.release();
        }
    })
    .unwrap();

    for _ in 0..SIGNALS {
        sem.acquire();
    }
    producer.join();
    assert_eq!(sem.available(), 0);
}

// ---------------------------------------------------------------------------
// Condition variable: waiters see the guarded state the notifier wrote
// ---------------------------------------------------------------------------

#[test]
fn condvar_wakes_waiter_after_state_change() {
    let heap = leaked_heap();
    let state: &'static Mutex<u32> = Box::leak(Box::new(Mutex::new(0)));
    let cvar: &'static Condvar = Box::leak(Box::new(Condvar::new()));

    let mut setter = Thread::spawn_in(heap, move || {
        *state.lock() = 42;
        cvar.notify_all();
    })
    .unwrap();

    let guard = state.lock();
    let guard = cvar.wait_while(guard, |v| *v != 42);
    assert_eq!(*guard, 42);
    drop(guard);
    setter.join();
}

#[test]
fn condvar_notify_all_releases_every_waiter() {
    const WAITERS: usize = 6;

    static WOKEN: AtomicU64 = AtomicU64::new(0);

    let heap = leaked_heap();
    let gate: &'static Mutex<bool> = Box::leak(Box::new(Mutex::new(false)));
    let cvar: &'static Condvar = Box::leak(Box::new(Condvar::new()));

    let threads: Vec<_> = (0..WAITERS)
        .map(|_| {
            Thread::spawn_in(heap, move || {
                let guard = gate.lock();
                let _guard = cvar.wait_while(guard, |open| !*open);
                WOKEN.fetch_add(1, Ordering::AcqRel);
            })
            .unwrap()
        })
        .collect();

    // Let the waiters park, open the gate, wake them all.
    strata::platform::sleep_ms(50);
    *gate.lock() = true;
    cvar.notify_all();

    for mut t in threads {
        t.join();
    }
    assert_eq!(WOKEN.load(Ordering::Acquire), WAITERS as u64);
}
