//! SFS directory entries: fixed 16-byte `{inum: u16, name[14]}` slots
//! (spec.md §3).
//!
//! Ground: teacher `fs/mod.rs::Dirent` / `fs/inode.rs::DirentIter`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::param::DIRSIZ;

pub const DIRENT_SIZE: usize = std::mem::size_of::<Dirent>();

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dirent {
    pub inum: u16,
    name: [u8; DIRSIZ],
}

impl Dirent {
    pub const HOLE: Dirent = Dirent {
        inum: 0,
        name: [0; DIRSIZ],
    };

    pub fn new(inum: u16, name: &str) -> Self {
        let mut bytes = [0u8; DIRSIZ];
        let src = name.as_bytes();
        let len = src.len().min(DIRSIZ);
        bytes[..len].copy_from_slice(&src[..len]);
        Self { inum, name: bytes }
    }

    /// Name with trailing NULs trimmed. Truncated names (exactly `DIRSIZ`
    /// bytes) carry no terminator, matching `FileName`'s layout in the
    /// teacher.
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn is_hole(&self) -> bool {
        self.inum == 0
    }

    pub fn as_bytes(&self) -> &[u8; DIRENT_SIZE] {
        zerocopy::IntoBytes::as_bytes(self)
            .try_into()
            .expect("dirent: size mismatch")
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Dirent::read_from_bytes(bytes).expect("dirent: malformed bytes")
    }
}
