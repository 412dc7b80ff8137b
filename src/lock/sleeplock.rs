//! A long-term, content-guarding lock that sleeps (rather than spins) while
//! contended.
//!
//! Ground: teacher `lock/sleeplock.rs` (`RawSleeplock` built from a
//! `Sleepablelock<i32>` holding the owner, `-1` meaning unlocked). This plays
//! the role of the inode cache's BUSY bit (spec.md §4.1): a locked
//! `Sleeplock` *is* BUSY, an unlocked one is not, and a lock request that
//! finds it held sleeps on the same `WaitChannel` the release wakes.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use super::WaitChannel;

pub struct Sleeplock<T> {
    locked: Mutex<bool>,
    chan: WaitChannel,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `locked`/`chan`: only the task
// that observes `locked == false -> true` under the mutex may dereference
// `data`, and it alone can toggle `locked` back on release.
unsafe impl<T: Send> Sync for Sleeplock<T> {}

pub struct SleeplockGuard<'a, T> {
    lock: &'a Sleeplock<T>,
}

impl<T> Sleeplock<T> {
    pub fn new(data: T) -> Self {
        Self {
            locked: Mutex::new(false),
            chan: WaitChannel::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks (sleeping, not spinning) until the lock is free, then takes it.
    pub fn lock(&self) -> SleeplockGuard<'_, T> {
        let mut held = self.locked.lock().expect("sleeplock: poisoned");
        while *held {
            held = self.chan.sleep(held);
        }
        *held = true;
        drop(held);
        SleeplockGuard { lock: self }
    }

    /// Takes the lock only if it is currently free.
    pub fn try_lock(&self) -> Option<SleeplockGuard<'_, T>> {
        let mut held = self.locked.lock().expect("sleeplock: poisoned");
        if *held {
            return None;
        }
        *held = true;
        Some(SleeplockGuard { lock: self })
    }

    /// Whether the lock is currently held by anyone (for assertions only).
    pub fn is_locked(&self) -> bool {
        *self.locked.lock().expect("sleeplock: poisoned")
    }

    fn unlock(&self) {
        let mut held = self.locked.lock().expect("sleeplock: poisoned");
        *held = false;
        drop(held);
        self.chan.wakeup();
    }
}

impl<T> Deref for SleeplockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard means `locked == true` was set by us and
        // will not be cleared until this guard drops.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleeplockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref`; exclusive because `&mut self` here requires
        // unique access to the guard, and the guard is the only handle that
        // can reach `data`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleeplockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
