//! Sleep/wakeup, built on a condition variable.
//!
//! Ground: teacher `proc/wait_channel.rs`. There, `sleep` atomically drops
//! the caller's lock and parks the process in the scheduler, to be requeued
//! by a matching `wakeup`. We preserve exactly that contract — "release lock
//! atomically on sleep, reacquire on wake" (spec.md §9) — using
//! `Condvar::wait`, since blocking the OS thread is this crate's equivalent
//! of giving up the CPU (the scheduler itself is an external collaborator).

use std::sync::{Condvar, MutexGuard};

#[derive(Default)]
pub struct WaitChannel {
    condvar: Condvar,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self {
            condvar: Condvar::new(),
        }
    }

    /// Atomically releases `guard`'s mutex and sleeps; reacquires it before
    /// returning. Callers loop on their wait condition, same as the
    /// teacher's `while cond { chan.sleep(...) }` idiom.
    pub fn sleep<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.condvar.wait(guard).expect("wait_channel: poisoned")
    }

    /// Wake every task sleeping on this channel.
    pub fn wakeup(&self) {
        self.condvar.notify_all();
    }
}
