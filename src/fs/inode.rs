//! The process-wide inode cache (spec.md §2 layer 4, §4.1).
//!
//! Ground: teacher `fs/inode.rs`'s `Itable = Spinlock<ArrayArena<Inode, NINODE>>`
//! plus its `Rc`-refcounted `Inode` arena slots. The teacher's arena hands out
//! raw, manually refcounted pointers into a `no_std` allocator-free array; we
//! keep the same two-lock shape (a `Spinlock` over identity/refcount, a
//! `Sleeplock` per slot guarding payload, exactly matching spec.md's "cache
//! lock protects `ref`/`flags`; `BUSY` protects everything else") but back it
//! with a `Box<[Sleeplock<_>]>` of fixed length that is never reallocated —
//! slot references stay valid for the cache's lifetime without unsafe
//! pointer arithmetic.

use crate::lock::{Sleeplock, Spinlock};
use crate::stat::FileKind;
use crate::stat::FsKind;

/// SFS-specific inode payload (spec.md §3 "SFS payload").
#[derive(Debug, Clone)]
pub struct SfsPayload {
    pub typ: FileKind,
    pub major: u16,
    pub minor: u16,
    pub nlink: i16,
    pub size: u32,
    /// Direct block numbers, plus one trailing indirect block number.
    pub addrs: [u32; crate::param::NDIRECT + 1],
}

impl SfsPayload {
    pub fn empty() -> Self {
        Self {
            typ: FileKind::None,
            major: 0,
            minor: 0,
            nlink: 0,
            size: 0,
            addrs: [0; crate::param::NDIRECT + 1],
        }
    }
}

/// FAT-specific inode payload (spec.md §3 "FAT payload"). `minor` is
/// repurposed to carry the creation date/time per spec.md; `dircluster` is
/// the first cluster of the parent directory.
#[derive(Debug, Clone)]
pub struct FatPayload {
    pub typ: FileKind,
    pub major: u16,
    pub minor: u16,
    pub nlink: i16,
    pub size: u32,
    pub dircluster: u32,
}

impl FatPayload {
    pub fn empty() -> Self {
        Self {
            typ: FileKind::None,
            major: 0,
            minor: 0,
            nlink: 0,
            size: 0,
            dircluster: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum InodePayload {
    Sfs(SfsPayload),
    Fat(FatPayload),
}

impl InodePayload {
    pub fn typ(&self) -> FileKind {
        match self {
            InodePayload::Sfs(p) => p.typ,
            InodePayload::Fat(p) => p.typ,
        }
    }

    pub fn set_typ(&mut self, typ: FileKind) {
        match self {
            InodePayload::Sfs(p) => p.typ = typ,
            InodePayload::Fat(p) => p.typ = typ,
        }
    }

    pub fn nlink(&self) -> i16 {
        match self {
            InodePayload::Sfs(p) => p.nlink,
            InodePayload::Fat(p) => p.nlink,
        }
    }

    pub fn set_nlink(&mut self, nlink: i16) {
        match self {
            InodePayload::Sfs(p) => p.nlink = nlink,
            InodePayload::Fat(p) => p.nlink = nlink,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            InodePayload::Sfs(p) => p.size,
            InodePayload::Fat(p) => p.size,
        }
    }

    pub fn major(&self) -> u16 {
        match self {
            InodePayload::Sfs(p) => p.major,
            InodePayload::Fat(p) => p.major,
        }
    }

    pub fn minor(&self) -> u16 {
        match self {
            InodePayload::Sfs(p) => p.minor,
            InodePayload::Fat(p) => p.minor,
        }
    }

    pub fn as_sfs(&self) -> &SfsPayload {
        match self {
            InodePayload::Sfs(p) => p,
            InodePayload::Fat(_) => panic!("inode: expected sfs payload"),
        }
    }

    pub fn as_sfs_mut(&mut self) -> &mut SfsPayload {
        match self {
            InodePayload::Sfs(p) => p,
            InodePayload::Fat(_) => panic!("inode: expected sfs payload"),
        }
    }

    pub fn as_fat(&self) -> &FatPayload {
        match self {
            InodePayload::Fat(p) => p,
            InodePayload::Sfs(_) => panic!("inode: expected fat payload"),
        }
    }

    pub fn as_fat_mut(&mut self) -> &mut FatPayload {
        match self {
            InodePayload::Fat(p) => p,
            InodePayload::Sfs(_) => panic!("inode: expected fat payload"),
        }
    }
}

/// Everything guarded by a slot's `Sleeplock`, i.e. everything except
/// identity and refcount (spec.md §4.1: "`VALID` ⇒ on-disk metadata has been
/// read into the payload").
pub struct InodeState {
    pub valid: bool,
    pub payload: InodePayload,
}

/// Identity and refcount, guarded by the cache-wide `Spinlock` (spec.md
/// §4.1: "Cache lock protects `ref` and `flags`").
#[derive(Debug, Clone, Copy)]
struct SlotMeta {
    in_use: bool,
    fskind: FsKind,
    dev: u32,
    inum: u32,
    refcount: usize,
}

impl SlotMeta {
    const fn free() -> Self {
        Self {
            in_use: false,
            fskind: FsKind::Sfs,
            dev: 0,
            inum: 0,
            refcount: 0,
        }
    }
}

/// The process-wide, fixed-capacity inode cache shared by both engines
/// (spec.md §3 "Inode cache", §4.1).
pub struct ICache {
    meta: Spinlock<Vec<SlotMeta>>,
    content: Box<[Sleeplock<InodeState>]>,
}

impl ICache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let content = (0..capacity)
            .map(|_| {
                Sleeplock::new(InodeState {
                    valid: false,
                    payload: InodePayload::Sfs(SfsPayload::empty()),
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            meta: Spinlock::new(vec![SlotMeta::free(); capacity]),
            content,
        }
    }

    pub fn capacity(&self) -> usize {
        self.content.len()
    }

    /// `iget`: finds the existing slot for `(fskind, dev, inum)` and bumps
    /// its refcount, or allocates a free slot and sets identity fields with
    /// refcount 1, `VALID` left unset. Panics if no slot is free (spec.md
    /// §4.1: "Fails fatally if no slot is free").
    pub fn get(&self, fskind: FsKind, dev: u32, inum: u32) -> usize {
        let mut meta = self.meta.lock();

        if let Some(slot) = meta
            .iter()
            .position(|m| m.in_use && m.fskind == fskind && m.dev == dev && m.inum == inum)
        {
            meta[slot].refcount += 1;
            return slot;
        }

        let free_slot = meta
            .iter()
            .position(|m| !m.in_use)
            .unwrap_or_else(|| panic!("icache: no free inode slots (capacity {})", meta.len()));

        meta[free_slot] = SlotMeta {
            in_use: true,
            fskind,
            dev,
            inum,
            refcount: 1,
        };
        free_slot
    }

    /// `idup`: increments refcount under the cache lock.
    pub fn dup(&self, slot: usize) {
        let mut meta = self.meta.lock();
        meta[slot].refcount += 1;
    }

    pub fn identity(&self, slot: usize) -> (FsKind, u32, u32) {
        let meta = self.meta.lock();
        let m = meta[slot];
        (m.fskind, m.dev, m.inum)
    }

    /// Decrements refcount and returns the value *after* decrementing.
    /// Leaves the slot `in_use` for the caller to evaluate whether a
    /// truncate is owed before the content lock is released; the caller
    /// marks the slot free via [`ICache::free_slot`] once done.
    pub fn dec_ref(&self, slot: usize) -> usize {
        let mut meta = self.meta.lock();
        meta[slot].refcount -= 1;
        meta[slot].refcount
    }

    pub fn refcount(&self, slot: usize) -> usize {
        self.meta.lock()[slot].refcount
    }

    /// Marks a zero-refcount slot free for reuse. Only valid to call once
    /// any truncation owed to a dropped-to-zero inode has completed.
    pub fn free_slot(&self, slot: usize) {
        let mut meta = self.meta.lock();
        debug_assert_eq!(meta[slot].refcount, 0, "icache: freeing a referenced slot");
        meta[slot] = SlotMeta::free();
    }

    /// `ilock`'s blocking half: waits until the slot's BUSY bit (the
    /// `Sleeplock` itself) clears, then takes it.
    pub fn lock_content(&self, slot: usize) -> crate::lock::SleeplockGuard<'_, InodeState> {
        self.content[slot].lock()
    }
}
