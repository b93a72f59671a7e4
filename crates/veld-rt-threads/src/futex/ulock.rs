// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Reduced futex variant: Darwin `__ulock_wait`/`__ulock_wake`.
//!
//! No bounded wait at this capability level. Callers that need one
//! must build for the full variant; nothing here emulates it.

use std::ffi::c_void;
use std::sync::atomic::AtomicU32;

const UL_COMPARE_AND_WAIT: u32 = 1;
const ULF_WAKE_ALL: u32 = 0x0000_0100;
const ULF_NO_ERRNO: u32 = 0x0100_0000;

extern "C" {
    fn __ulock_wait(operation: u32, addr: *mut c_void, value: u64, timeout_us: u32) -> libc::c_int;
    fn __ulock_wake(operation: u32, addr: *mut c_void, wake_value: u64) -> libc::c_int;
}

pub(super) fn wait(word: &AtomicU32, expected: u32) {
    // Timeout zero means wait forever.
    unsafe {
        __ulock_wait(
            UL_COMPARE_AND_WAIT | ULF_NO_ERRNO,
            word.as_ptr().cast::<c_void>(),
            u64::from(expected),
            0,
        );
    }
}

pub(super) fn wake(word: &AtomicU32, max_waiters: u32) {
    let addr = word.as_ptr().cast::<c_void>();
    if max_waiters >= i32::MAX as u32 {
        unsafe {
            __ulock_wake(UL_COMPARE_AND_WAIT | ULF_NO_ERRNO | ULF_WAKE_ALL, addr, 0);
        }
        return;
    }
    // One waiter per call; a negative return means nobody was parked.
    for _ in 0..max_waiters {
        let rc = unsafe { __ulock_wake(UL_COMPARE_AND_WAIT | ULF_NO_ERRNO, addr, 0) };
        if rc < 0 {
            break;
        }
    }
}
