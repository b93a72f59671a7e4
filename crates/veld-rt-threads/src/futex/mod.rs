// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Futex: block on a 32-bit word, wake blockers on that word.
//!
//! Thinnest possible wrapper over the kernel primitive. All retry loops
//! and lock-ordering logic belong to the caller; the only contract is
//! that a wake happening after a waiter observed `expected` unblocks
//! it. A wake that lands strictly before the kernel checked `expected`
//! may be missed, which is why callers always pair this with their own
//! re-check of the word.
//!
//! Two capability levels, selected at build time: `linux` has bounded
//! waits, `ulock` (Darwin) does not.

use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(target_os = "linux")]
use std::time::Duration;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use self::linux as sys;

#[cfg(target_os = "macos")]
mod ulock;
#[cfg(target_os = "macos")]
use self::ulock as sys;

/// A 32-bit word the kernel can park threads on.
///
/// Embed it in a structure that outlives every waiter; the word's
/// address is the key the kernel matches waiters and wakers on. The
/// value itself is opaque to this layer; callers impose their own
/// meaning (lock state, generation counter). All parties on one word
/// get process-local semantics.
#[derive(Debug, Default)]
pub struct Futex {
    word: AtomicU32,
}

impl Futex {
    pub const fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
        }
    }

    pub fn load(&self) -> u32 {
        self.word.load(Ordering::SeqCst)
    }

    pub fn store(&self, value: u32) {
        self.word.store(value, Ordering::SeqCst);
    }

    /// Wrapping add; returns the new value.
    pub fn add(&self, delta: u32) -> u32 {
        self.word.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
    }

    pub fn swap(&self, value: u32) -> u32 {
        self.word.swap(value, Ordering::SeqCst)
    }

    /// Store `new` if the word still holds `old`. Returns whether it did.
    pub fn compare_and_swap(&self, old: u32, new: u32) -> bool {
        self.word
            .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Sleep until woken at this word, unless the value no longer equals
    /// `expected` at the moment the kernel checks it.
    ///
    /// Returns on explicit wake, on unrelated signal delivery, or
    /// immediately when the value already differs, with nothing telling
    /// the cases apart. Treat any return as a hint to re-check the
    /// condition, never as proof it changed.
    pub fn wait(&self, expected: u32) {
        sys::wait(&self.word, expected);
    }

    /// Like `wait`, but gives up after at most `timeout` of blocking.
    ///
    /// Only the full (Linux) variant has a bounded wait; deployments on
    /// the reduced variant must arrange their own periodic wake if they
    /// need one.
    #[cfg(target_os = "linux")]
    pub fn wait_timeout(&self, expected: u32, timeout: Duration) {
        sys::wait_timeout(&self.word, expected, timeout);
    }

    /// Wake up to `max_waiters` threads blocked on this word. Waking
    /// nobody is not an error.
    pub fn wake(&self, max_waiters: u32) {
        sys::wake(&self.word, max_waiters);
    }

    pub fn wake_one(&self) {
        self.wake(1);
    }

    pub fn wake_all(&self) {
        // The kernel takes the count as a signed int.
        self.wake(i32::MAX as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_when_value_differs() {
        let f = Futex::new(1);
        // Kernel-side compare fails against the stale expected value.
        f.wait(0);
    }

    #[test]
    fn wake_with_no_waiters_is_ok() {
        let f = Futex::new(0);
        f.wake_one();
        f.wake_all();
    }

    #[test]
    fn wake_unblocks_waiter() {
        let f = Arc::new(Futex::new(0));
        let waiter = {
            let f = f.clone();
            thread::spawn(move || {
                while f.load() == 0 {
                    f.wait(0);
                }
            })
        };
        thread::sleep(Duration::from_millis(50));
        f.store(1);
        f.wake_one();
        waiter.join().unwrap();
    }

    #[test]
    fn wake_caps_number_of_unblocked_waiters() {
        let f = Arc::new(Futex::new(0));
        let resumed = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let f = f.clone();
            let resumed = resumed.clone();
            waiters.push(thread::spawn(move || {
                while f.load() == 0 {
                    f.wait(0);
                }
                resumed.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // Let all four park in the kernel before waking.
        thread::sleep(Duration::from_millis(100));
        f.store(1);
        f.wake_one();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(resumed.load(Ordering::SeqCst), 1);

        f.wake_all();
        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(resumed.load(Ordering::SeqCst), 4);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn bounded_wait_elapses() {
        use std::time::Instant;

        let f = Futex::new(0);
        let start = Instant::now();
        f.wait_timeout(0, Duration::from_millis(50));
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(45),
            "returned too early: {:?}",
            elapsed
        );
        assert!(elapsed < Duration::from_secs(5), "did not time out: {:?}", elapsed);
    }
}
