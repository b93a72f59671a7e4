// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Futex-backed sync helpers for the runtime layers above.
//!
//! Semaphore parks single waiters (pause/resume handshakes); RawMutex
//! guards short critical sections. Both need only unbounded wait/wake,
//! so they work at either futex capability level.

use crate::futex::Futex;

/// Barebones counting semaphore over one futex word.
///
/// With multiple waiters, a single `post` releases nobody until the
/// count climbs back to zero. Fine for its intended single-waiter uses.
#[derive(Debug, Default)]
pub struct Semaphore {
    futex: Futex,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            futex: Futex::new(0),
        }
    }

    /// Increment the count, waking waiters once it reaches zero.
    pub fn post(&self) {
        let new_value = self.futex.add(1);
        if new_value == 0 {
            self.futex.wake_all();
        }
    }

    /// Decrement the count, blocking while it is negative.
    pub fn wait(&self) {
        let mut value = self.futex.add(-1i32 as u32);
        loop {
            if (value as i32) >= 0 {
                return;
            }
            self.futex.wait(value);
            value = self.futex.load();
        }
    }
}

/// Futex mutex: 0 unlocked, 1 locked, 2 locked with waiters.
///
/// No guard and no payload; callers pair `lock`/`unlock` themselves.
/// Does not detect unlocking an unlocked mutex.
#[derive(Debug, Default)]
pub struct RawMutex {
    futex: Futex,
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            futex: Futex::new(0),
        }
    }

    pub fn lock(&self) {
        // Uncontended fast path.
        if self.futex.compare_and_swap(0, 1) {
            return;
        }
        // Mark contended and sleep until the holder hands over.
        while self.futex.swap(2) != 0 {
            self.futex.wait(2);
        }
    }

    pub fn unlock(&self) {
        if self.futex.swap(0) == 2 {
            self.futex.wake_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn semaphore_post_then_wait_does_not_block() {
        let sem = Semaphore::new();
        sem.post();
        sem.wait();
    }

    #[test]
    fn semaphore_wait_blocks_until_post() {
        let sem = Arc::new(Semaphore::new());
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait())
        };
        thread::sleep(Duration::from_millis(50));
        sem.post();
        waiter.join().unwrap();
    }

    struct Guarded {
        lock: RawMutex,
        value: UnsafeCell<u64>,
    }

    // The mutex serializes every access to `value`.
    unsafe impl Sync for Guarded {}

    #[test]
    fn mutex_mutual_exclusion() {
        let shared = Arc::new(Guarded {
            lock: RawMutex::new(),
            value: UnsafeCell::new(0),
        });
        let mut handles = vec![];
        for _ in 0..8 {
            let shared = shared.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    shared.lock.lock();
                    unsafe { *shared.value.get() += 1 };
                    shared.lock.unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        shared.lock.lock();
        let total = unsafe { *shared.value.get() };
        shared.lock.unlock();
        assert_eq!(total, 8_000);
    }

    #[test]
    fn mutex_contended_unlock_wakes_waiter() {
        let m = Arc::new(RawMutex::new());
        m.lock();
        let waiter = {
            let m = m.clone();
            thread::spawn(move || {
                m.lock();
                m.unlock();
            })
        };
        // Give the waiter time to park on the contended state.
        thread::sleep(Duration::from_millis(50));
        m.unlock();
        waiter.join().unwrap();
    }
}
