// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! OS-thread task backend for the Veld runtime.
//!
//! Maps each runtime task onto one native OS thread. Two independent
//! OS-facing pieces, plus the helpers the runtime layers on top:
//! - futex: block on a 32-bit word, wake blockers on that word
//! - sync: futex-backed Semaphore and RawMutex
//! - task: spawn with handoff, current-task lookup, stack bound query,
//!   directed GC pause signal
//!
//! Run-queue policy, cooperative yielding, stack growth, and the
//! collector itself live upstream; this crate only hands them the
//! primitives.

pub mod futex;
pub mod sync;
pub mod task;
