//! Lock primitives used by the cache and the block layer.
//!
//! Ground: teacher `lock/mod.rs`, `lock/spinlock.rs`, `lock/sleeplock.rs`,
//! `proc/wait_channel.rs`. The teacher's locks are built on raw spinning plus
//! interrupt masking tied to a specific CPU/scheduler (`push_off`/`pop_off`,
//! `Cpu` pointers); those hooks belong to the process scheduler, which
//! spec.md §1/§6 explicitly treats as an external collaborator. This module
//! keeps the same two-tier naming (`Spinlock` for short critical sections
//! that must never be held across a sleep, `Sleeplock` for long-term,
//! content-guarding locks that may sleep while contended) but implements
//! them on top of `std::sync` rather than reimplementing a scheduler.

mod sleeplock;
mod spinlock;
mod wait_channel;

pub use sleeplock::{Sleeplock, SleeplockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
pub use wait_channel::WaitChannel;
