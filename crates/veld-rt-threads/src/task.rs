// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thread-backed tasks: one native OS thread per runtime task.
//!
//! Spawning hands the entry point, arguments, and task identity to the
//! new thread across a semaphore gate, so the creator never returns
//! before the new thread knows which task it runs. A reserved signal,
//! delivered per thread, lets the collector pause one thread at a time.

use std::cell::{Cell, UnsafeCell};
use std::ffi::c_void;
use std::io;
use std::mem;
use std::ptr;
use std::sync::OnceLock;

use log::trace;
use thiserror::Error;

thread_local! {
    // Installed once per thread (init_main, or the spawn trampoline),
    // read-only afterwards from this thread's point of view.
    static CURRENT_TASK: Cell<*mut c_void> = Cell::new(ptr::null_mut());
}

/// Opaque reference to a scheduler-owned task structure.
///
/// This layer never looks inside; it only parks the pointer in the
/// per-thread cell and hands it back on request.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TaskRef(*mut c_void);

impl TaskRef {
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

// Only the address travels between threads; the pointee stays with the
// scheduler.
unsafe impl Send for TaskRef {}

/// Native thread handle.
///
/// The scheduler stores these in pointer-sized slots; the handoff
/// assumes the sizes match, so a wider `pthread_t` is a build defect.
#[repr(transparent)]
#[derive(Clone, Copy, Debug)]
pub struct OsThread(libc::pthread_t);

const _: () = assert!(
    mem::size_of::<libc::pthread_t>() == mem::size_of::<*mut c_void>(),
    "thread handles must be pointer-sized"
);

// An identifier, not a reference to thread-owned memory.
unsafe impl Send for OsThread {}

/// Task entry point: the compiled wrapper the scheduler hands down,
/// paired with its argument block.
pub type TaskEntry = unsafe extern "C" fn(*mut c_void);

/// Callbacks the scheduler supplies at bootstrap.
pub struct RuntimeHooks {
    /// Runs on the exiting thread, after the task body returns and
    /// before the OS thread terminates.
    pub task_exited: fn(TaskRef),
    /// Handler for the reserved pause signal. Runs on the signalled
    /// thread at an arbitrary instruction boundary, so async-signal-safe
    /// code only (no allocation, no locks the interrupted code may
    /// already hold).
    pub pause: extern "C" fn(libc::c_int),
}

static HOOKS: OnceLock<RuntimeHooks> = OnceLock::new();

/// Reserved pause signal. A real-time signal stays clear of the
/// commonly hooked SIGUSR pair.
#[cfg(target_os = "linux")]
fn pause_signal() -> libc::c_int {
    libc::SIGRTMIN() + 6
}

/// No real-time signals off Linux; SIGUSR2 is the conventional slot.
#[cfg(not(target_os = "linux"))]
fn pause_signal() -> libc::c_int {
    libc::SIGUSR2
}

/// The OS refused to create a thread. Whether to retry, degrade, or
/// abort is the caller's decision.
#[derive(Debug, Error)]
#[error("could not start task thread: {0}")]
pub struct SpawnError(#[from] io::Error);

/// One-shot record handing entry, args, and identity to a new thread.
///
/// Owned by the creator until the gate opens, then never touched again
/// from either side.
struct StartState {
    entry: TaskEntry,
    args: *mut c_void,
    task: TaskRef,
    // Posted by the new thread while the creator waits; the semaphore
    // itself is the synchronization, hence the cell.
    start_gate: UnsafeCell<libc::sem_t>,
}

/// Bootstrap the initial thread as a task. Call once, before any
/// `start`; calling twice panics.
///
/// Installs `task` as this thread's current task, registers the pause
/// handler process-wide (delivery stays per-thread via `pthread_kill`),
/// and returns this thread's handle for the scheduler to keep.
pub fn init_main(task: TaskRef, hooks: RuntimeHooks) -> OsThread {
    let pause = hooks.pause;
    if HOOKS.set(hooks).is_err() {
        panic!("task runtime initialized twice");
    }
    CURRENT_TASK.with(|cell| cell.set(task.as_ptr()));

    let thread = unsafe {
        let mut act: libc::sigaction = mem::zeroed();
        act.sa_sigaction = pause as usize;
        libc::sigemptyset(&mut act.sa_mask);
        let rc = libc::sigaction(pause_signal(), &act, ptr::null_mut());
        assert_eq!(rc, 0, "failed to register the pause signal handler");
        libc::pthread_self()
    };
    let thread = OsThread(thread);
    trace!("task runtime: main task {:?} on thread {:?}", task, thread);
    thread
}

extern "C" fn task_trampoline(arg: *mut c_void) -> *mut c_void {
    // Copy every field out before opening the gate: the creator's stack
    // frame is reused as soon as it unblocks.
    let (entry, args, task) = unsafe {
        let state = &*arg.cast::<StartState>();
        let fields = (state.entry, state.args, state.task);
        CURRENT_TASK.with(|cell| cell.set(fields.2.as_ptr()));
        libc::sem_post(state.start_gate.get());
        fields
    };

    unsafe { entry(args) };

    trace!("task runtime: task {:?} exited", task);
    let hooks = HOOKS.get().expect("task runtime not initialized");
    (hooks.task_exited)(task);
    ptr::null_mut()
}

/// Start `entry(args)` as task `task` on a new OS thread.
///
/// Does not return until the new thread has copied the handoff record
/// and installed its current-task cell, so the scheduler can use the
/// task/thread pair the moment this returns. No retry on failure.
pub fn start(entry: TaskEntry, args: *mut c_void, task: TaskRef) -> Result<OsThread, SpawnError> {
    let state = StartState {
        entry,
        args,
        task,
        start_gate: UnsafeCell::new(unsafe { mem::zeroed() }),
    };

    let mut thread: libc::pthread_t = unsafe { mem::zeroed() };
    unsafe {
        libc::sem_init(state.start_gate.get(), 0, 0);
        let rc = libc::pthread_create(
            &mut thread,
            ptr::null(),
            task_trampoline,
            (&state as *const StartState as *mut StartState).cast::<c_void>(),
        );
        if rc != 0 {
            libc::sem_destroy(state.start_gate.get());
            return Err(SpawnError(io::Error::from_raw_os_error(rc)));
        }
        // `state` lives on this frame; hold it alive until the new
        // thread has read every field. An interrupted wait is not a
        // handoff signal.
        while libc::sem_wait(state.start_gate.get()) != 0 {}
        libc::sem_destroy(state.start_gate.get());
    }

    let thread = OsThread(thread);
    trace!("task runtime: started task {:?} on thread {:?}", task, thread);
    Ok(thread)
}

/// The task executing on the calling thread.
///
/// Valid only after `init_main` (initial thread) or once `start`'s
/// handoff has completed (spawned threads); panics otherwise.
pub fn current() -> TaskRef {
    let ptr = CURRENT_TASK.with(Cell::get);
    assert!(!ptr.is_null(), "no current task on this thread");
    TaskRef(ptr)
}

/// Highest address of the calling thread's stack, for the collector's
/// upper scan bound. Describes only the calling thread.
#[cfg(target_os = "linux")]
pub fn stack_top() -> usize {
    unsafe {
        let mut attr: libc::pthread_attr_t = mem::zeroed();
        libc::pthread_getattr_np(libc::pthread_self(), &mut attr);
        let mut stack_base: *mut c_void = ptr::null_mut();
        let mut stack_size: libc::size_t = 0;
        libc::pthread_attr_getstack(&attr, &mut stack_base, &mut stack_size);
        libc::pthread_attr_destroy(&mut attr);
        stack_base as usize + stack_size
    }
}

/// Highest address of the calling thread's stack. Darwin reports the
/// high end directly.
#[cfg(target_os = "macos")]
pub fn stack_top() -> usize {
    unsafe { libc::pthread_get_stackaddr_np(libc::pthread_self()) as usize }
}

/// Ask one specific thread to pause for the collector.
///
/// Fire-and-forget: no delivery confirmation, and signalling a thread
/// that already exited is a no-op.
pub fn send_pause_signal(thread: OsThread) {
    unsafe {
        libc::pthread_kill(thread.0, pause_signal());
    }
}
