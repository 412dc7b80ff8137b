//! The block device contract (spec.md §6) and the buffer cache built above
//! it (spec.md §2 layer 1, §4/§5 "bread may sleep").

mod bio;
mod device;

pub use bio::{Buf, BufCache};
pub use device::{BlockDevice, MemBlockDevice};

pub use crate::param::SECTOR_SIZE;
