//! A short-critical-section lock.
//!
//! Ground: teacher `lock/spinlock.rs`. The original disables interrupts and
//! busy-waits on an atomic pointer; here the interrupt controller is out of
//! scope (external collaborator), so `Spinlock<T>` is a thin, honestly-named
//! wrapper over `std::sync::Mutex<T>`. The contract callers must uphold is
//! unchanged from the teacher's: never sleep (block on a `Sleeplock` or a
//! `WaitChannel`) while holding a `Spinlock` guard.

use std::sync::{Mutex, MutexGuard};

pub struct Spinlock<T> {
    inner: Mutex<T>,
}

pub type SpinlockGuard<'a, T> = MutexGuard<'a, T>;

impl<T> Spinlock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        self.inner.lock().expect("spinlock: poisoned")
    }
}
