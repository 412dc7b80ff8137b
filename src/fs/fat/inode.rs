//! FAT32 inode operations: directory lookup/link, read/write, truncate
//! (spec.md §4.3).
//!
//! Ground: `original_source/xv6/fs/fat32/fat_inode.c`'s `fat_ilock`,
//! `fat_iupdate`, `fat_dirlookup`, `fat_dirlink`, `fat_readi`, `fat_writei`,
//! `fat_itrunc`. The original scans a directory's cluster chain
//! sector-by-sector, tracking LDIR/DIR placement with several mutable
//! cursor variables that straddle sector and cluster boundaries. SPEC_FULL.md
//! §4.3 documents the simplification taken here: a directory's cluster
//! chain is treated as one flat, indexable sequence of 32-byte slots, which
//! preserves the documented algorithm (classify entries, accumulate long
//! names, place LDIR+DIR contiguously) without replicating the original's
//! exact cursor bookkeeping.
//!
//! A second documented deviation: spec.md §4.3 describes a new empty
//! short-entry (`FstClusHI/LO == 0`) whose first cluster is assigned lazily
//! by `calloc` the first time it is `ilock`ed. Since a FAT inode's identity
//! *is* its first-cluster number (spec.md §4.3 "Inode identity"), lazily
//! assigning that cluster after the inode may already have a cache slot
//! keyed on inum `0` doesn't fit this crate's fixed-identity [`ICache`].
//! Instead this engine allocates the first cluster at creation time
//! ([`FatEngine::dirlink`]): every live FAT inode has a real first cluster
//! for its whole lifetime. Externally this is unobservable — a new file
//! still reads back as size 0 — it only means a zero-byte file reserves one
//! cluster a little earlier than the original would.

use std::sync::Arc;

use crate::block::{BlockDevice, BufCache};
use crate::error::{FsError, FsResult};
use crate::fs::inode::{FatPayload, InodePayload};
use crate::stat::FileKind;

use super::bpb::{FatConfig, RawBpb};
use super::cluster::{calloc, chain, extend_chain, free_chain, FatAllocator};
use super::dirent::{
    classify, dir_from_bytes, long_dir_from_bytes, Dir, EntryKind, LongDir, DIR_ENTRY_SIZE,
    LAST_LONG_ENTRY,
};
use super::shortname::{bump_collision, checksum, is_valid, synthesize, upper};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, IntoBytes};

/// Sentinel encoding used by the original for zero-size, non-directory
/// files: `FileSize == 1` with `CrtTimeTenth == 0x5A` means "the real size
/// is 0" (spec.md §3 "FAT32 zero-size sentinel").
const ZERO_SIZE_SENTINEL_TENTH: u8 = 0x5A;

pub struct FatEngine {
    pub dev: u32,
    bufs: BufCache,
    cfg: FatConfig,
    alloc: FatAllocator,
}

impl FatEngine {
    pub fn mount(device: Arc<dyn BlockDevice>, dev: u32, buffer_cache_slots: usize) -> Self {
        let bufs = BufCache::new(device, buffer_cache_slots);
        let buf = bufs.read(dev, 0);
        let raw = RawBpb::read_from_bytes(&buf.data[..std::mem::size_of::<RawBpb>()])
            .expect("fat: bpb bytes malformed");
        let cfg = FatConfig::from_raw(&raw);
        let alloc = FatAllocator::mount(&bufs, dev, &cfg);
        Self { dev, bufs, cfg, alloc }
    }

    pub fn root_inum(&self) -> u32 {
        self.cfg.root_cluster
    }

    /// Allocates the first cluster for a brand-new file or directory. The
    /// caller uses the result as the new inode's `inum` before calling
    /// [`FatEngine::dirlink`].
    pub fn alloc_first_cluster(&self) -> u32 {
        calloc(&self.bufs, self.dev, &self.cfg, &self.alloc)
    }

    fn entries_per_cluster(&self) -> usize {
        (self.cfg.bytes_per_cluster() / DIR_ENTRY_SIZE as u32) as usize
    }

    fn slot_location(&self, chain: &[u32], index: usize) -> Option<(u32, u32)> {
        let entries_per_cluster = self.entries_per_cluster();
        let cluster_idx = index / entries_per_cluster;
        let entry_in_cluster = index % entries_per_cluster;
        let cluster = *chain.get(cluster_idx)?;
        let first_sector = self.cfg.first_sector_of_cluster(cluster);
        let entries_per_sector = self.cfg.entries_per_sector() as usize;
        let sector = first_sector + (entry_in_cluster / entries_per_sector) as u32;
        let byte_off = (entry_in_cluster % entries_per_sector) as u32 * DIR_ENTRY_SIZE as u32;
        Some((sector, byte_off))
    }

    fn read_slot(&self, chain: &[u32], index: usize) -> Option<[u8; DIR_ENTRY_SIZE]> {
        let (sector, off) = self.slot_location(chain, index)?;
        let buf = self.bufs.read(self.dev, sector);
        let off = off as usize;
        Some(buf.data[off..off + DIR_ENTRY_SIZE].try_into().unwrap())
    }

    fn write_slot(&self, chain: &[u32], index: usize, raw: &[u8; DIR_ENTRY_SIZE]) {
        let (sector, off) = self.slot_location(chain, index).expect("fat: slot out of chain");
        let mut buf = self.bufs.read(self.dev, sector);
        let off = off as usize;
        buf.data[off..off + DIR_ENTRY_SIZE].copy_from_slice(raw);
        self.bufs.write(&buf);
    }

    fn dir_chain(&self, first_cluster: u32) -> Vec<u32> {
        chain(&self.bufs, self.dev, &self.cfg, first_cluster)
    }

    /// Walks a directory's entries, classifying each raw 32-byte slot and
    /// accumulating long-name fragments ahead of their terminating `Dir`
    /// entry. Calls `f(index_of_dir_entry, dir, long_name)` for every live
    /// short entry; stops at `EndOfDirectory` or when `f` returns `Some`.
    fn scan_dir<T>(
        &self,
        chain: &[u32],
        mut f: impl FnMut(usize, &Dir, Option<&str>) -> Option<T>,
    ) -> Option<T> {
        let entries_per_cluster = self.entries_per_cluster();
        let total_slots = chain.len() * entries_per_cluster;

        let mut long_units: Vec<(u8, [u16; 13])> = Vec::new();

        for index in 0..total_slots {
            let Some(raw) = self.read_slot(chain, index) else {
                break;
            };
            match classify(&raw) {
                EntryKind::EndOfDirectory => break,
                EntryKind::Empty => long_units.clear(),
                EntryKind::LongName => {
                    let l = long_dir_from_bytes(&raw);
                    long_units.push((l.ord & !LAST_LONG_ENTRY, l.name_units()));
                }
                EntryKind::Dir | EntryKind::File => {
                    let d = dir_from_bytes(&raw);
                    let long_name = if long_units.is_empty() {
                        None
                    } else {
                        long_units.sort_by_key(|(ord, _)| *ord);
                        Some(decode_long_name(&long_units))
                    };
                    let result = f(index, &d, long_name.as_deref());
                    long_units.clear();
                    if result.is_some() {
                        return result;
                    }
                }
                EntryKind::VolumeLabel => long_units.clear(),
            }
        }
        None
    }

    /// Finds the DIR entry for `target`, returning it along with the
    /// cluster of the directory that holds it. There is no persisted
    /// parent pointer in the FAT format itself (spec.md §3 "FAT payload":
    /// `dircluster` is reconstructed, not stored on disk), so this walks
    /// down from `dir_inum` rather than requiring the caller to already
    /// know the parent.
    fn find_entry(&self, dir_inum: u32, target: u32) -> Option<(Dir, u32)> {
        let chain = self.dir_chain(dir_inum);
        if let Some(d) = self.scan_dir(&chain, |_, d, _| (d.first_cluster() == target).then_some(*d)) {
            return Some((d, dir_inum));
        }

        let mut subdirs = Vec::new();
        self.scan_dir(&chain, |_, d, _| {
            if d.attr & super::dirent::ATTR_DIRECTORY != 0 {
                subdirs.push(d.first_cluster());
            }
            None::<()>
        });
        for sub in subdirs {
            if let Some(found) = self.find_entry(sub, target) {
                return Some(found);
            }
        }
        None
    }

    /// `fat_ilock`: locates `inum`'s DIR entry by walking down from the
    /// root. `inum == root_inum()` is handled specially: the root has no
    /// DIR entry of its own.
    pub fn read_inode(&self, inum: u32) -> InodePayload {
        if inum == self.root_inum() {
            return InodePayload::Fat(FatPayload {
                typ: FileKind::Dir,
                major: 0,
                minor: 0,
                nlink: 1,
                size: 0,
                dircluster: 0,
            });
        }

        let (d, dircluster) = self
            .find_entry(self.root_inum(), inum)
            .unwrap_or_else(|| panic!("fat: no directory entry for inum {inum}"));

        InodePayload::Fat(FatPayload {
            typ: if d.attr & super::dirent::ATTR_DIRECTORY != 0 {
                FileKind::Dir
            } else {
                FileKind::File
            },
            major: d.crt_time.get(),
            minor: d.crt_date.get(),
            nlink: 1,
            size: decode_size(&d),
            dircluster,
        })
    }

    /// `fat_iupdate`: rewrites the DIR entry's size/attrs in place,
    /// re-encoding the zero-size sentinel.
    pub fn update_inode(&self, inum: u32, payload: &InodePayload) {
        if inum == self.root_inum() {
            return;
        }
        let p = payload.as_fat();
        let chain = self.dir_chain(p.dircluster);
        let index = self
            .scan_dir(&chain, |i, d, _| (d.first_cluster() == inum).then_some(i))
            .unwrap_or_else(|| panic!("fat: no directory entry for inum {inum}"));

        let mut raw = self.read_slot(&chain, index).expect("fat: slot vanished");
        let mut d = dir_from_bytes(&raw);
        encode_size(&mut d, p.size, p.typ);
        if p.typ == FileKind::Dir {
            d.attr |= super::dirent::ATTR_DIRECTORY;
        }
        raw.copy_from_slice(d.as_bytes());
        self.write_slot(&chain, index, &raw);
    }

    /// `fat_readi`: reads block-by-block from the file's cluster chain
    /// (rooted at `inum`, since inum *is* the first cluster), clamped to
    /// `size`.
    pub fn read(&self, payload: &InodePayload, inum: u32, off: u32, dst: &mut [u8]) -> usize {
        let p = payload.as_fat();
        if off > p.size {
            return 0;
        }
        let n = (dst.len() as u32).min(p.size - off) as usize;
        if n == 0 {
            return 0;
        }
        let clusters = self.dir_chain(inum);
        let bpc = self.cfg.bytes_per_cluster();
        let mut total = 0usize;
        let mut pos = off;
        while total < n {
            let cluster_idx = (pos / bpc) as usize;
            let Some(&cluster) = clusters.get(cluster_idx) else {
                break;
            };
            let in_cluster = pos % bpc;
            let first_sector = self.cfg.first_sector_of_cluster(cluster);
            let sector_in_cluster = in_cluster / self.cfg.bytes_per_sector;
            let byte_in_sector = (in_cluster % self.cfg.bytes_per_sector) as usize;
            let buf = self.bufs.read(self.dev, first_sector + sector_in_cluster);
            let chunk = (self.cfg.bytes_per_sector as usize - byte_in_sector).min(n - total);
            dst[total..total + chunk].copy_from_slice(&buf.data[byte_in_sector..byte_in_sector + chunk]);
            total += chunk;
            pos += chunk as u32;
        }
        total
    }

    /// `fat_writei`: writes block-by-block, extending the cluster chain via
    /// [`extend_chain`] when `off + n` runs past the current chain's
    /// capacity, then extending `size`.
    pub fn write(&self, payload: &mut InodePayload, inum: u32, off: u32, src: &[u8]) -> FsResult<usize> {
        {
            let p = payload.as_fat();
            if off > p.size {
                return Err(FsError::InvalidArgument);
            }
        }

        let bpc = self.cfg.bytes_per_cluster();
        let mut clusters = self.dir_chain(inum);

        let mut total = 0usize;
        let mut pos = off;
        while total < src.len() {
            let cluster_idx = (pos / bpc) as usize;
            while cluster_idx >= clusters.len() {
                let tail = *clusters.last().unwrap();
                let new = extend_chain(&self.bufs, self.dev, &self.cfg, &self.alloc, tail);
                clusters.push(new);
            }
            let cluster = clusters[cluster_idx];
            let in_cluster = pos % bpc;
            let first_sector = self.cfg.first_sector_of_cluster(cluster);
            let sector_in_cluster = in_cluster / self.cfg.bytes_per_sector;
            let byte_in_sector = (in_cluster % self.cfg.bytes_per_sector) as usize;
            let mut buf = self.bufs.read(self.dev, first_sector + sector_in_cluster);
            let chunk = (self.cfg.bytes_per_sector as usize - byte_in_sector).min(src.len() - total);
            buf.data[byte_in_sector..byte_in_sector + chunk]
                .copy_from_slice(&src[total..total + chunk]);
            self.bufs.write(&buf);
            total += chunk;
            pos += chunk as u32;
        }

        let p = payload.as_fat_mut();
        if pos > p.size {
            p.size = pos;
        }
        Ok(total)
    }

    /// Marks the DIR entry at `index` (and any preceding LDIR fragments
    /// linked to it by checksum) deleted. Shared by [`FatEngine::truncate`]
    /// and [`FatEngine::remove_entry`].
    fn delete_entry_at(&self, dirchain: &[u32], index: usize) {
        let chksum = {
            let raw = self.read_slot(dirchain, index).unwrap();
            checksum(&dir_from_bytes(&raw).name)
        };
        let mut raw = self.read_slot(dirchain, index).unwrap();
        raw[0] = super::dirent::ENTRY_DELETED;
        self.write_slot(dirchain, index, &raw);

        let mut i = index;
        while i > 0 {
            i -= 1;
            let Some(mut raw) = self.read_slot(dirchain, i) else { break };
            if classify(&raw) != EntryKind::LongName {
                break;
            }
            if long_dir_from_bytes(&raw).chksum != chksum {
                break;
            }
            raw[0] = super::dirent::ENTRY_DELETED;
            self.write_slot(dirchain, i, &raw);
        }
    }

    /// `fat_itrunc`: marks the DIR entry (and any linked LDIR fragments)
    /// deleted and frees the cluster chain.
    pub fn truncate(&self, payload: &mut InodePayload, inum: u32) {
        let p = payload.as_fat_mut();
        let dirchain = self.dir_chain(p.dircluster);
        let index = self.scan_dir(&dirchain, |i, d, _| (d.first_cluster() == inum).then_some(i));

        if let Some(index) = index {
            self.delete_entry_at(&dirchain, index);
        }

        free_chain(&self.bufs, self.dev, &self.cfg, &self.alloc, inum);
        p.size = 0;
    }

    /// Removes the named entry from `dir_inum` without touching the
    /// child's own cluster chain (the caller's [`Inode::drop`] truncates
    /// the child separately once its link count reaches zero).
    pub fn remove_entry(&self, dir_inum: u32, name: &str) -> FsResult<()> {
        let chain = self.dir_chain(dir_inum);
        let index = self
            .scan_dir(&chain, |i, d, long_name| {
                let matches = long_name.map(|n| n == name).unwrap_or(false)
                    || pack_as_short_literal(name).map(|s| s == d.name).unwrap_or(false)
                    || format_short_dotted(&d.name).eq_ignore_ascii_case(name);
                matches.then_some(i)
            })
            .ok_or(FsError::NotFound)?;
        self.delete_entry_at(&chain, index);
        Ok(())
    }

    /// `fat_dirlookup`: classify-and-accumulate scan for `name`, matching
    /// against the three forms spec.md §4.3 names: the accumulated long
    /// name, the raw packed short name, and the NUL/space-trimmed dotted
    /// short name. `"."` resolves to `dir_inum` itself; `".."` resolves to
    /// the stored parent-first-cluster field (falling back to the root
    /// when this directory has none, i.e. it already is the root).
    pub fn dirlookup(&self, payload: &InodePayload, dir_inum: u32, name: &str) -> Option<(u32, u32)> {
        let p = payload.as_fat();
        assert_eq!(p.typ, FileKind::Dir, "fat: dirlookup: not a directory");

        if name == "." {
            return Some((dir_inum, 0));
        }
        if name == ".." {
            let parent = if p.dircluster != 0 { p.dircluster } else { self.root_inum() };
            return Some((parent, 0));
        }

        let chain = self.dir_chain(dir_inum);
        let literal_short = pack_as_short_literal(name);

        self.scan_dir(&chain, |i, d, long_name| {
            let matches = long_name.map(|n| n == name).unwrap_or(false)
                || literal_short.map(|s| s == d.name).unwrap_or(false)
                || format_short_dotted(&d.name).eq_ignore_ascii_case(name);
            matches.then(|| (d.first_cluster(), i as u32))
        })
    }

    /// Reverse lookup: finds the name under which `child_inum` is linked
    /// inside `dir_inum`, for `getcwd` path reconstruction.
    pub fn dirlookup_name_by_inum(&self, dir_inum: u32, child_inum: u32) -> Option<String> {
        let chain = self.dir_chain(dir_inum);
        self.scan_dir(&chain, |_, d, long_name| {
            (d.first_cluster() == child_inum)
                .then(|| long_name.map(str::to_string).unwrap_or_else(|| format_short_dotted(&d.name)))
        })
    }

    /// `fat_dirlink`: synthesizes the 8.3 short name (bumping on collision),
    /// writes LDIR fragments (highest `Ord` first) followed by the DIR
    /// entry into the first contiguous run of free slots, extending the
    /// chain if none is found. `new_inum` must already have been allocated
    /// via [`FatEngine::alloc_first_cluster`].
    pub fn dirlink(
        &self,
        payload: &InodePayload,
        dir_inum: u32,
        name: &str,
        new_inum: u32,
        is_dir: bool,
    ) -> FsResult<()> {
        if self.dirlookup(payload, dir_inum, name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let mut chain = self.dir_chain(dir_inum);

        let mut short = synthesize(name);
        loop {
            let collides = self
                .scan_dir(&chain, |_, d, _| (d.name == short).then_some(()))
                .is_some();
            if !collides {
                break;
            }
            bump_collision(&mut short);
        }

        let units = encode_long_name(name);
        let needed = units.len() + 1;
        let entries_per_cluster = self.entries_per_cluster();

        let mut start = 0usize;
        loop {
            while start + needed > chain.len() * entries_per_cluster {
                let tail = *chain.last().unwrap();
                chain.push(extend_chain(&self.bufs, self.dev, &self.cfg, &self.alloc, tail));
            }

            let free = (start..start + needed).all(|i| {
                self.read_slot(&chain, i)
                    .map(|raw| matches!(classify(&raw), EntryKind::Empty | EntryKind::EndOfDirectory))
                    .unwrap_or(false)
            });
            if free {
                break;
            }
            start += 1;
        }

        let chksum = checksum(&short);
        let count = units.len();
        for (i, unit) in units.iter().enumerate() {
            let ord = (count - i) as u8;
            let l = LongDir::from_name_units(ord, i == 0, chksum, unit);
            self.write_slot(&chain, start + (count - 1 - i), &l.as_bytes().try_into().unwrap());
        }

        let mut d = Dir {
            name: short,
            attr: if is_dir { super::dirent::ATTR_DIRECTORY } else { super::dirent::ATTR_ARCHIVE },
            nt_res: 0,
            crt_time_tenth: 0,
            crt_time: U16::new(0),
            crt_date: U16::new(0),
            lst_acc_date: U16::new(0),
            fst_clus_hi: U16::new(0),
            wrt_time: U16::new(0),
            wrt_date: U16::new(0),
            fst_clus_lo: U16::new(0),
            file_size: U32::new(0),
        };
        d.set_first_cluster(new_inum);
        encode_size(&mut d, 0, if is_dir { FileKind::Dir } else { FileKind::File });
        self.write_slot(&chain, start + count, &d.as_bytes().try_into().unwrap());

        Ok(())
    }

    /// `fat_isdirempty`: true iff the chain holds no live entry besides a
    /// terminator.
    pub fn isdirempty(&self, inum: u32) -> bool {
        let chain = self.dir_chain(inum);
        self.scan_dir(&chain, |_, _, _| Some(())).is_none()
    }
}

fn decode_size(d: &Dir) -> u32 {
    if d.attr & super::dirent::ATTR_DIRECTORY == 0
        && d.file_size.get() == 1
        && d.crt_time_tenth == ZERO_SIZE_SENTINEL_TENTH
    {
        0
    } else {
        d.file_size.get()
    }
}

fn encode_size(d: &mut Dir, size: u32, typ: FileKind) {
    if typ != FileKind::Dir && size == 0 {
        d.file_size = U32::new(1);
        d.crt_time_tenth = ZERO_SIZE_SENTINEL_TENTH;
    } else {
        d.file_size = U32::new(size);
        if d.crt_time_tenth == ZERO_SIZE_SENTINEL_TENTH {
            d.crt_time_tenth = 0;
        }
    }
}

/// Splits `name` into UTF-16 13-unit chunks, `0xFFFF`-padded, in storage
/// order (first fragment holds the start of the name).
fn encode_long_name(name: &str) -> Vec<[u16; 13]> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let mut chunks = Vec::new();
    for chunk in units.chunks(13) {
        let mut unit = [0xFFFFu16; 13];
        unit[..chunk.len()].copy_from_slice(chunk);
        if chunk.len() < 13 {
            unit[chunk.len()] = 0x0000;
        }
        chunks.push(unit);
    }
    if chunks.is_empty() {
        chunks.push([0x0000; 13]);
    }
    chunks
}

fn decode_long_name(fragments: &[(u8, [u16; 13])]) -> String {
    let mut units = Vec::new();
    for (_, unit) in fragments {
        for &u in unit {
            if u == 0x0000 || u == 0xFFFF {
                break;
            }
            units.push(u);
        }
    }
    String::from_utf16_lossy(&units)
}

/// If `name` already conforms to bare 8.3 shape (ASCII, base ≤ 8 chars, at
/// most one `.`, extension ≤ 3 chars, only valid characters), packs it as
/// the literal 11-byte short-name form with no `~N` suffix added.
fn pack_as_short_literal(name: &str) -> Option<[u8; 11]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !bytes.is_ascii() {
        return None;
    }
    let dotpos = bytes.iter().rposition(|&c| c == b'.');
    let (base, ext) = match dotpos {
        Some(p) => (&bytes[..p], &bytes[p + 1..]),
        None => (bytes, &bytes[0..0]),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    if !base.iter().chain(ext).all(|&c| is_valid(c)) {
        return None;
    }
    let mut out = [0x20u8; 11];
    for (i, &c) in base.iter().enumerate() {
        out[i] = upper(c);
    }
    for (i, &c) in ext.iter().enumerate() {
        out[8 + i] = upper(c);
    }
    Some(out)
}

/// Reconstructs the dotted display form of a packed short name (trims
/// trailing spaces from both halves, omits the dot if there is no
/// extension).
fn format_short_dotted(raw: &[u8; 11]) -> String {
    let base_end = raw[..8].iter().rposition(|&c| c != b' ').map_or(0, |i| i + 1);
    let ext_end = raw[8..].iter().rposition(|&c| c != b' ').map_or(0, |i| i + 1);
    let base = std::str::from_utf8(&raw[..base_end]).unwrap_or("");
    if ext_end == 0 {
        base.to_string()
    } else {
        let ext = std::str::from_utf8(&raw[8..8 + ext_end]).unwrap_or("");
        format!("{base}.{ext}")
    }
}
