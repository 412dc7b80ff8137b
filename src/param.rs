//! Compile-time tunables.
//!
//! Mirrors the teacher's `param.rs`: sizes that in a hosted build would be
//! read from configuration are still given sane compiled-in defaults here,
//! and [`crate::config::MountConfig`] overrides the ones that make sense to
//! change per mount (cache sizes, boot file system).

use core::mem;

/// Sector size consumed from the block device layer (spec.md §6).
pub const SECTOR_SIZE: usize = 512;

/// SFS block size. One block is one sector in this implementation.
pub const BSIZE: usize = SECTOR_SIZE;

/// Number of direct block pointers in an SFS inode.
pub const NDIRECT: usize = 12;

/// Number of block pointers reachable through the single indirect block.
pub const NINDIRECT: usize = BSIZE / mem::size_of::<u32>();

/// Largest file size (in blocks) representable by an SFS inode.
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// Bitmap bits per block.
pub const BPB: u32 = (BSIZE * 8) as u32;

/// Max file name length for SFS directory entries.
pub const DIRSIZ: usize = 14;

/// Max file name length (UTF-16 code units) for FAT32 long names.
pub const FAT_DIRSIZ: usize = 260;

/// Default size of the process-wide in-memory inode cache.
pub const NINODE: usize = 128;

/// Default size of the block buffer cache (in sectors).
pub const NBUF: usize = 256;

/// Root inode number on SFS.
pub const SFS_ROOTINO: u32 = 1;

/// Largest path accepted by a syscall.
pub const MAXPATH: usize = 4096;

/// Largest number of simultaneously open files per process.
pub const NOFILE: usize = 64;
