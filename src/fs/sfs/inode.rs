//! SFS inode operations: allocation, bmap, read/write, directories, truncate
//! (spec.md §4.2).
//!
//! Ground: teacher `fs/inode.rs` (`InodeGuard::{dirlink, dirlookup, update,
//! itrunc, bmap_internal, is_dir_empty}`), reworked to operate on a detached
//! [`SfsPayload`] (the cache already holds the lock) instead of a
//! `Sleeplock`-wrapped `Inode` reference.

use std::sync::Arc;

use static_assertions::const_assert;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::block::{BlockDevice, Buf, BufCache};
use crate::error::{FsError, FsResult};
use crate::fs::inode::{InodePayload, SfsPayload};
use crate::param::{BSIZE, NDIRECT, NINDIRECT, SFS_ROOTINO};
use crate::stat::FileKind;

use super::alloc::{balloc, bfree};
use super::dirent::{Dirent, DIRENT_SIZE};
use super::log::{SfsLog, SfsTransaction};
use super::superblock::{RawSuperblock, Superblock, SFS_SUPERBLOCK_SECTOR};

/// On-disk inode slot layout (spec.md §6: `{i16 type, i16 major, i16 minor,
/// i16 nlink, u32 size, u32 addrs[NDIRECT+1]}`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dinode {
    typ: i16,
    major: i16,
    minor: i16,
    nlink: i16,
    size: u32,
    addrs: [u32; NDIRECT + 1],
}

// A block must hold a whole number of inode slots with no cross-sector
// straddling, same invariant as the teacher's `IPB <= BufData / Dinode`.
const_assert!(BSIZE / std::mem::size_of::<Dinode>() > 0);
const_assert!(BSIZE % std::mem::align_of::<Dinode>() == 0);

pub struct SfsEngine {
    pub dev: u32,
    bufs: BufCache,
    sb: Superblock,
    log: SfsLog,
}

impl SfsEngine {
    /// Mounts an SFS volume: reads the superblock at sector 1 and derives
    /// the rest of the on-disk layout.
    pub fn mount(device: Arc<dyn BlockDevice>, dev: u32, buffer_cache_slots: usize) -> Self {
        let bufs = BufCache::new(device, buffer_cache_slots);
        let raw_buf = bufs.read(dev, SFS_SUPERBLOCK_SECTOR);
        let raw = RawSuperblock::read_from_bytes(&raw_buf.data[..std::mem::size_of::<RawSuperblock>()])
            .expect("sfs: superblock bytes malformed");
        let sb = Superblock::from_raw(raw, std::mem::size_of::<Dinode>());
        Self {
            dev,
            bufs,
            sb,
            log: SfsLog::new(),
        }
    }

    pub fn root_inum(&self) -> u32 {
        SFS_ROOTINO
    }

    pub fn begin_transaction(&self) -> SfsTransaction<'_> {
        self.log.begin()
    }

    fn dinode_slot(&self, buf: &Buf, inum: u32) -> Dinode {
        let ipb = self.sb.ipb as usize;
        let slot = inum as usize % ipb;
        let size = std::mem::size_of::<Dinode>();
        Dinode::read_from_bytes(&buf.data[slot * size..(slot + 1) * size])
            .expect("sfs: dinode bytes malformed")
    }

    fn write_dinode_slot(&self, buf: &mut Buf, inum: u32, dinode: &Dinode) {
        let ipb = self.sb.ipb as usize;
        let slot = inum as usize % ipb;
        let size = std::mem::size_of::<Dinode>();
        buf.data[slot * size..(slot + 1) * size].copy_from_slice(dinode.as_bytes());
    }

    /// `ilock`'s disk-read half: fills `VALID` payload from the on-disk
    /// inode slot.
    pub fn read_inode(&self, inum: u32) -> InodePayload {
        let block = self.sb.iblock(inum);
        let buf = self.bufs.read(self.dev, block);
        let d = self.dinode_slot(&buf, inum);
        InodePayload::Sfs(SfsPayload {
            typ: match d.typ {
                0 => FileKind::None,
                1 => FileKind::Dir,
                2 => FileKind::File,
                3 => FileKind::Dev,
                other => panic!("sfs: inode {inum} has invalid on-disk type {other}"),
            },
            major: d.major as u16,
            minor: d.minor as u16,
            nlink: d.nlink,
            size: d.size,
            addrs: d.addrs,
        })
    }

    /// `iupdate`: persists every on-disk field after any in-memory change.
    pub fn update_inode(&self, inum: u32, payload: &InodePayload) {
        let p = payload.as_sfs();
        let block = self.sb.iblock(inum);
        let mut buf = self.bufs.read(self.dev, block);
        let d = Dinode {
            typ: match p.typ {
                FileKind::None => 0,
                FileKind::Dir => 1,
                FileKind::File => 2,
                FileKind::Dev => 3,
            },
            major: p.major as i16,
            minor: p.minor as i16,
            nlink: p.nlink,
            size: p.size,
            addrs: p.addrs,
        };
        self.write_dinode_slot(&mut buf, inum, &d);
        self.bufs.write(&buf);
    }

    /// `ialloc`: the first inode slot with on-disk `type == 0`. Fatal on
    /// exhaustion (spec.md §7).
    pub fn ialloc(&self, typ: FileKind) -> u32 {
        for inum in 1..self.sb.ninodes {
            let block = self.sb.iblock(inum);
            let mut buf = self.bufs.read(self.dev, block);
            let mut d = self.dinode_slot(&buf, inum);
            if d.typ == 0 {
                d.typ = match typ {
                    FileKind::None => 0,
                    FileKind::Dir => 1,
                    FileKind::File => 2,
                    FileKind::Dev => 3,
                };
                d.nlink = 0;
                d.size = 0;
                d.addrs = [0; NDIRECT + 1];
                self.write_dinode_slot(&mut buf, inum, &d);
                self.bufs.write(&buf);
                return inum;
            }
        }
        panic!("sfs: ialloc: out of inodes (dev {})", self.dev);
    }

    /// `bmap`: resolves (allocating on zero) the `bn`th logical block of a
    /// file.
    fn bmap(&self, payload: &mut SfsPayload, bn: usize) -> u32 {
        if bn < NDIRECT {
            if payload.addrs[bn] == 0 {
                payload.addrs[bn] = balloc(&self.bufs, self.dev, &self.sb);
            }
            return payload.addrs[bn];
        }

        let bn = bn - NDIRECT;
        assert!(bn < NINDIRECT, "sfs: bmap: out of range");

        if payload.addrs[NDIRECT] == 0 {
            payload.addrs[NDIRECT] = balloc(&self.bufs, self.dev, &self.sb);
        }
        let indirect = payload.addrs[NDIRECT];

        let mut buf = self.bufs.read(self.dev, indirect);
        let entry_off = bn * 4;
        let mut addr = u32::from_ne_bytes(buf.data[entry_off..entry_off + 4].try_into().unwrap());
        if addr == 0 {
            addr = balloc(&self.bufs, self.dev, &self.sb);
            buf.data[entry_off..entry_off + 4].copy_from_slice(&addr.to_ne_bytes());
            self.bufs.write(&buf);
        }
        addr
    }

    /// Clamps `off` to `size` and reads block-by-block via [`bmap`].
    pub fn read(&self, payload: &InodePayload, off: u32, dst: &mut [u8]) -> usize {
        let p = payload.as_sfs();
        let mut off = off;
        if off > p.size {
            return 0;
        }
        let n = (dst.len() as u32).min(p.size - off) as usize;
        let mut total = 0usize;
        // Read-only bmap: we must not allocate, so re-derive addresses via a
        // throwaway mutable copy (reads never extend a file, so no new
        // blocks are actually allocated by this call in practice — every
        // addressed block already exists because `off + n <= size`).
        let mut scratch = p.clone();
        while total < n {
            let bn = (off as usize) / BSIZE;
            let block_off = (off as usize) % BSIZE;
            let addr = self.bmap(&mut scratch, bn);
            let buf = self.bufs.read(self.dev, addr);
            let chunk = (BSIZE - block_off).min(n - total);
            dst[total..total + chunk].copy_from_slice(&buf.data[block_off..block_off + chunk]);
            total += chunk;
            off += chunk as u32;
        }
        total
    }

    /// Writes block-by-block, extending `size`/`addrs` as needed, then
    /// persists the inode.
    pub fn write(&self, payload: &mut InodePayload, off: u32, src: &[u8]) -> FsResult<usize> {
        let p = payload.as_sfs_mut();
        if off > p.size {
            return Err(FsError::InvalidArgument);
        }
        let mut off = off;
        let mut total = 0usize;
        while total < src.len() {
            let bn = (off as usize) / BSIZE;
            let block_off = (off as usize) % BSIZE;
            let addr = self.bmap(p, bn);
            let mut buf = self.bufs.read(self.dev, addr);
            let chunk = (BSIZE - block_off).min(src.len() - total);
            buf.data[block_off..block_off + chunk].copy_from_slice(&src[total..total + chunk]);
            self.bufs.write(&buf);
            total += chunk;
            off += chunk as u32;
        }
        if off > p.size {
            p.size = off;
        }
        Ok(total)
    }

    /// `itrunc`: frees every referenced direct block, then the indirect
    /// block after freeing each of its pointers, and zeroes `size`.
    pub fn truncate(&self, payload: &mut InodePayload) {
        let p = payload.as_sfs_mut();
        for addr in p.addrs[..NDIRECT].iter_mut() {
            if *addr != 0 {
                bfree(&self.bufs, self.dev, &self.sb, *addr);
                *addr = 0;
            }
        }
        if p.addrs[NDIRECT] != 0 {
            let buf = self.bufs.read(self.dev, p.addrs[NDIRECT]);
            for chunk in buf.data.chunks_exact(4) {
                let a = u32::from_ne_bytes(chunk.try_into().unwrap());
                if a != 0 {
                    bfree(&self.bufs, self.dev, &self.sb, a);
                }
            }
            bfree(&self.bufs, self.dev, &self.sb, p.addrs[NDIRECT]);
            p.addrs[NDIRECT] = 0;
        }
        p.size = 0;
    }

    fn dirent_at(&self, payload: &InodePayload, off: u32) -> Dirent {
        let mut raw = [0u8; DIRENT_SIZE];
        let n = self.read(payload, off, &mut raw);
        assert_eq!(n, DIRENT_SIZE, "sfs: short directory read at offset {off}");
        Dirent::from_bytes(&raw)
    }

    /// `dirlookup`: linear scan skipping holes (`inum == 0`).
    pub fn dirlookup(&self, payload: &InodePayload, name: &str) -> Option<(u32, u32)> {
        assert_eq!(payload.typ(), FileKind::Dir, "sfs: dirlookup: not a directory");
        let size = payload.size();
        let mut off = 0;
        while off < size {
            let de = self.dirent_at(payload, off);
            if !de.is_hole() && de.name() == name {
                return Some((de.inum as u32, off));
            }
            off += DIRENT_SIZE as u32;
        }
        None
    }

    /// `dirlink`: fills the first hole or extends the directory. Rejects
    /// duplicate names.
    pub fn dirlink(&self, payload: &mut InodePayload, name: &str, inum: u32) -> FsResult<()> {
        if self.dirlookup(payload, name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let size = payload.size();
        let mut off = 0;
        let hole_off = loop {
            if off >= size {
                break size;
            }
            let de = self.dirent_at(payload, off);
            if de.is_hole() {
                break off;
            }
            off += DIRENT_SIZE as u32;
        };

        let de = Dirent::new(inum as u16, name);
        let n = self.write(payload, hole_off, de.as_bytes())?;
        assert_eq!(n, DIRENT_SIZE, "sfs: dirlink: short write");
        Ok(())
    }

    /// Reverse lookup: finds the name under which `child_inum` is linked
    /// inside this directory, for `getcwd` path reconstruction.
    pub fn dirlookup_name_by_inum(&self, payload: &InodePayload, child_inum: u32) -> Option<String> {
        let size = payload.size();
        let mut off = 0;
        while off < size {
            let de = self.dirent_at(payload, off);
            if !de.is_hole() && de.inum as u32 == child_inum {
                return Some(de.name().to_string());
            }
            off += DIRENT_SIZE as u32;
        }
        None
    }

    /// Overwrites the named dirent with a hole. Does not touch the
    /// child's own inode; the caller's [`Inode::drop`] handles nlink and
    /// truncation.
    pub fn unlink_entry(&self, payload: &mut InodePayload, name: &str) -> FsResult<()> {
        let (_, off) = self.dirlookup(payload, name).ok_or(FsError::NotFound)?;
        let n = self.write(payload, off, Dirent::HOLE.as_bytes())?;
        assert_eq!(n, DIRENT_SIZE, "sfs: unlink_entry: short write");
        Ok(())
    }

    /// Every non-hole, non-`.`/`..` entry's name and inum, for recursive
    /// tree deletion (spec.md §4.5 `remove`).
    pub fn list_entries(&self, payload: &InodePayload) -> Vec<(String, u32)> {
        let size = payload.size();
        let mut out = Vec::new();
        let mut off = 0;
        while off < size {
            let de = self.dirent_at(payload, off);
            if !de.is_hole() && de.name() != "." && de.name() != ".." {
                out.push((de.name().to_string(), de.inum as u32));
            }
            off += DIRENT_SIZE as u32;
        }
        out
    }

    /// `is_dir_empty`: true iff every slot after `.`/`..` is a hole.
    pub fn isdirempty(&self, payload: &InodePayload) -> bool {
        let size = payload.size();
        let mut off = 2 * DIRENT_SIZE as u32;
        while off < size {
            let de = self.dirent_at(payload, off);
            if !de.is_hole() {
                return false;
            }
            off += DIRENT_SIZE as u32;
        }
        true
    }
}
