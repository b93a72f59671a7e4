// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Full futex variant: `SYS_futex` with the process-local flag.
//!
//! The only capability level with a bounded wait.

use std::ptr;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

pub(super) fn wait(word: &AtomicU32, expected: u32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            ptr::null::<libc::timespec>(),
        );
    }
}

pub(super) fn wait_timeout(word: &AtomicU32, expected: u32, timeout: Duration) {
    // Relative timeout, split into whole seconds and leftover nanos.
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            &ts,
        );
    }
}

pub(super) fn wake(word: &AtomicU32, max_waiters: u32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            max_waiters,
        );
    }
}
