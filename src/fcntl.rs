//! `open()` mode flags.
//!
//! Ground: spec.md §6 ("O_RDONLY=0, O_WRONLY=1, O_RDWR=2, O_CREATE=0x200").
//! Kept as a plain newtype rather than `bitflags!` because `O_RDONLY` is
//! zero and the readable/writable predicates are not simple membership
//! tests (same shape as the teacher's `FcntlFlags`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0x000;
    pub const O_WRONLY: u32 = 0x001;
    pub const O_RDWR: u32 = 0x002;
    pub const O_CREATE: u32 = 0x200;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Readable iff not `O_WRONLY`.
    pub const fn readable(self) -> bool {
        self.0 & Self::O_WRONLY == 0
    }

    /// Writable iff `O_WRONLY` or `O_RDWR`.
    pub const fn writable(self) -> bool {
        self.0 & Self::O_WRONLY != 0 || self.0 & Self::O_RDWR != 0
    }

    pub const fn creates(self) -> bool {
        self.0 & Self::O_CREATE != 0
    }
}
