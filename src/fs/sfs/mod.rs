//! The SFS engine (spec.md §2 layer 2, §4.2).

mod alloc;
mod dirent;
mod inode;
mod log;
mod superblock;

pub use inode::{Dinode, SfsEngine};
pub use log::SfsTransaction;
