//! Cluster allocation and FAT chain traversal (spec.md §4.3).
//!
//! Ground: `original_source/xv6/fs/fat32/fat_inode.c`'s `fat_calloc`,
//! `fat_cclear`, `fat_updateFATs`, and the chain-walk loop repeated at every
//! directory/read/write/truncate call site. SPEC_FULL.md §4.3 folds the
//! repeated "mirror to every `NumFATs` copy" step into one
//! [`write_fat_entry`] helper instead of duplicating it per call site.

use log::warn;
use std::sync::Mutex;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, IntoBytes};

use crate::block::BufCache;

use super::bpb::{is_eof, FatConfig, RawFsInfo, LAST_FAT_ENTRY};

/// In-memory mirror of the FSInfo sector, refreshed/persisted alongside
/// every allocation (spec.md §4.3 "calloc").
pub struct FsInfo {
    pub free_count: u32,
    pub next_free: u32,
}

pub struct FatAllocator {
    pub fsinfo: Mutex<FsInfo>,
}

impl FatAllocator {
    pub fn mount(bufs: &BufCache, dev: u32, cfg: &FatConfig) -> Self {
        let buf = bufs.read(dev, cfg.fsinfo_sector);
        let raw = RawFsInfo::read_from_bytes(&buf.data[..std::mem::size_of::<RawFsInfo>()])
            .expect("fat: fsinfo bytes malformed");
        Self {
            fsinfo: Mutex::new(FsInfo {
                free_count: raw.free_count.get(),
                next_free: raw.next_free.get().max(2),
            }),
        }
    }

    fn persist(&self, bufs: &BufCache, dev: u32, cfg: &FatConfig) {
        let info = self.fsinfo.lock().expect("fat: fsinfo poisoned");
        let mut buf = bufs.read(dev, cfg.fsinfo_sector);
        let raw = RawFsInfo::read_from_bytes(&buf.data[..std::mem::size_of::<RawFsInfo>()])
            .expect("fat: fsinfo bytes malformed");
        let updated = RawFsInfo {
            free_count: U32::new(info.free_count),
            next_free: U32::new(info.next_free),
            ..raw
        };
        buf.data[..std::mem::size_of::<RawFsInfo>()].copy_from_slice(updated.as_bytes());
        bufs.write(&buf);
    }
}

/// `fat_getFATEntry`-style read, masked to the low 28 bits. FAT entries are
/// little-endian on disk regardless of host.
pub fn read_fat_entry(bufs: &BufCache, dev: u32, cfg: &FatConfig, n: u32) -> u32 {
    let (sector, offset) = cfg.fat_entry_location(n);
    let buf = bufs.read(dev, sector);
    let off = offset as usize;
    u32::from_le_bytes(buf.data[off..off + 4].try_into().unwrap()) & 0x0FFF_FFFF
}

/// Writes a FAT entry and mirrors it to every `NumFATs` copy (spec.md §5:
/// "Mirrored FAT copies are updated before releasing the primary FAT
/// buffer").
pub fn write_fat_entry(bufs: &BufCache, dev: u32, cfg: &FatConfig, n: u32, value: u32) {
    let (primary_sector, offset) = cfg.fat_entry_location(n);
    let off = offset as usize;
    for copy in 0..cfg.num_fats {
        let sector = primary_sector + copy * cfg.fat_size_32;
        let mut buf = bufs.read(dev, sector);
        buf.data[off..off + 4].copy_from_slice(&value.to_le_bytes());
        bufs.write(&buf);
    }
}

/// `fat_cclear`: zeroes every sector of a cluster.
pub fn clear_cluster(bufs: &BufCache, dev: u32, cfg: &FatConfig, cluster: u32) {
    let first = cfg.first_sector_of_cluster(cluster);
    for s in 0..cfg.sectors_per_cluster {
        let mut buf = bufs.read(dev, first + s);
        buf.data.fill(0);
        bufs.write(&buf);
    }
}

/// `fat_calloc`: scans from `Nxt_Free`, wrapping to `[2, Nxt_Free)` on
/// exhaustion of the tail. Fatal (panics) if no cluster is free anywhere.
pub fn calloc(bufs: &BufCache, dev: u32, cfg: &FatConfig, alloc: &FatAllocator) -> u32 {
    let start = { alloc.fsinfo.lock().expect("fat: fsinfo poisoned").next_free };
    let total = cfg.total_clusters();

    let found = (start..total)
        .find(|&c| read_fat_entry(bufs, dev, cfg, c) == 0)
        .or_else(|| (2..start).find(|&c| read_fat_entry(bufs, dev, cfg, c) == 0));

    let Some(c) = found else {
        panic!("fat: calloc: out of clusters (dev {dev})");
    };

    write_fat_entry(bufs, dev, cfg, c, LAST_FAT_ENTRY);
    clear_cluster(bufs, dev, cfg, c);

    {
        let mut info = alloc.fsinfo.lock().expect("fat: fsinfo poisoned");
        info.next_free = c + 1;
        info.free_count = info.free_count.saturating_sub(1);
        if info.free_count < 64 {
            warn!("fat: free cluster count low ({}) on dev {dev}", info.free_count);
        }
    }
    alloc.persist(bufs, dev, cfg);

    c
}

/// Walks a cluster chain from `start` to EOF, returning every cluster
/// number visited.
pub fn chain(bufs: &BufCache, dev: u32, cfg: &FatConfig, start: u32) -> Vec<u32> {
    let mut clusters = vec![start];
    let mut cno = start;
    loop {
        let entry = read_fat_entry(bufs, dev, cfg, cno);
        if is_eof(entry) {
            break;
        }
        clusters.push(entry);
        cno = entry;
    }
    clusters
}

/// Extends a chain ending at `tail` by one cluster, linking `tail -> new`
/// and terminating `new` with `LAST_FAT_ENTRY`.
pub fn extend_chain(bufs: &BufCache, dev: u32, cfg: &FatConfig, alloc: &FatAllocator, tail: u32) -> u32 {
    let new = calloc(bufs, dev, cfg, alloc);
    write_fat_entry(bufs, dev, cfg, tail, new);
    new
}

/// `fat_itrunc`'s cluster-freeing tail: walks the whole chain, zeroing each
/// cluster, clearing its FAT entry, and restoring `Free_Count`.
pub fn free_chain(bufs: &BufCache, dev: u32, cfg: &FatConfig, alloc: &FatAllocator, start: u32) {
    let clusters = chain(bufs, dev, cfg, start);
    for c in &clusters {
        clear_cluster(bufs, dev, cfg, *c);
        write_fat_entry(bufs, dev, cfg, *c, 0);
    }
    {
        let mut info = alloc.fsinfo.lock().expect("fat: fsinfo poisoned");
        info.free_count += clusters.len() as u32;
    }
    alloc.persist(bufs, dev, cfg);
}
