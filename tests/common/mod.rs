//! Disk-image bootstrapping for integration tests.
//!
//! There is no mkfs binary in this crate (spec.md names formatting an
//! external, out-of-scope concern); a real collaborator would have to build
//! one against the same public [`BlockDevice`] contract the engines mount
//! from. These helpers do exactly that: pack the on-disk headers and the
//! root directory by hand, using only `write_sector`, mirroring the byte
//! layouts the SFS and FAT32 engines expect at mount time.

use std::sync::Arc;

use duofs::block::{BlockDevice, MemBlockDevice, SECTOR_SIZE};

// --- SFS ---------------------------------------------------------------

pub const SFS_TOTAL_SECTORS: u32 = 200;
pub const SFS_NINODES: u32 = 50;
pub const SFS_NLOG: u32 = 3;
const SFS_IPB: u32 = 8; // BSIZE(512) / size_of::<Dinode>(64)
const SFS_DIRENT_SIZE: usize = 16;

/// Writes a minimal, valid SFS image: superblock, an all-metadata-used
/// bitmap, and a root inode (inum 1) whose single data block holds `.` and
/// `..`.
pub fn format_sfs() -> Arc<dyn BlockDevice> {
    let dev = Arc::new(MemBlockDevice::new(SFS_TOTAL_SECTORS as usize));

    let logstart = 2u32;
    let inodestart = logstart + SFS_NLOG;
    let nblocks_for_inodes = SFS_NINODES.div_ceil(SFS_IPB);
    let bmapstart = inodestart + nblocks_for_inodes;
    let root_block = bmapstart + 1;

    let mut sb = [0u8; SECTOR_SIZE];
    sb[0..4].copy_from_slice(&SFS_TOTAL_SECTORS.to_ne_bytes());
    sb[4..8].copy_from_slice(&(SFS_TOTAL_SECTORS - root_block).to_ne_bytes());
    sb[8..12].copy_from_slice(&SFS_NINODES.to_ne_bytes());
    sb[12..16].copy_from_slice(&SFS_NLOG.to_ne_bytes());
    dev.write_sector(1, &sb);

    let mut bitmap = [0u8; SECTOR_SIZE];
    for b in 0..=root_block {
        let byte = (b / 8) as usize;
        let mask = 1u8 << (b % 8);
        bitmap[byte] |= mask;
    }
    dev.write_sector(bmapstart, &bitmap);

    let mut inode_block = [0u8; SECTOR_SIZE];
    let slot = (1u32 % SFS_IPB) as usize; // root inum is 1
    let off = slot * 64;
    inode_block[off..off + 2].copy_from_slice(&1i16.to_ne_bytes()); // typ = Dir
    inode_block[off + 6..off + 8].copy_from_slice(&1i16.to_ne_bytes()); // nlink
    inode_block[off + 8..off + 12].copy_from_slice(&32u32.to_ne_bytes()); // size
    inode_block[off + 12..off + 16].copy_from_slice(&root_block.to_ne_bytes()); // addrs[0]
    dev.write_sector(inodestart, &inode_block);

    let mut dirblock = [0u8; SECTOR_SIZE];
    write_sfs_dirent(&mut dirblock[0..SFS_DIRENT_SIZE], 1, ".");
    write_sfs_dirent(&mut dirblock[SFS_DIRENT_SIZE..2 * SFS_DIRENT_SIZE], 1, "..");
    dev.write_sector(root_block, &dirblock);

    dev
}

fn write_sfs_dirent(slot: &mut [u8], inum: u16, name: &str) {
    slot[0..2].copy_from_slice(&inum.to_ne_bytes());
    let bytes = name.as_bytes();
    slot[2..2 + bytes.len()].copy_from_slice(bytes);
}

// --- FAT32 ---------------------------------------------------------------

// Sized so reserved + FAT sectors == one cluster's worth of sectors: every
// nominal cluster number up to `total_sectors / sectors_per_cluster` then
// maps to an in-bounds sector, with none left dangling past the real data
// region (which a looser ratio would leave reachable by `calloc`'s forward
// scan before it wraps).
pub const FAT_TOTAL_SECTORS: u32 = 40;
const FAT_RESERVED: u32 = 2;
const FAT_NUM_FATS: u32 = 1;
const FAT_SIZE_32: u32 = 2;
const FAT_SECTORS_PER_CLUSTER: u32 = 4;
const FAT_ROOT_CLUSTER: u32 = 2;
const FAT_FSINFO_SECTOR: u32 = 1;
const LAST_FAT_ENTRY: u32 = 0x0FFF_FFFF;
pub const FAT_BYTES_PER_CLUSTER: u32 = FAT_SECTORS_PER_CLUSTER * SECTOR_SIZE as u32;

/// Writes a minimal, valid FAT32 image: BPB, FSInfo, both FAT copies with
/// the root cluster terminated, and an all-zero root directory cluster
/// (a zeroed first byte classifies as end-of-directory, so an empty root is
/// already well-formed with no real entries needed).
pub fn format_fat32() -> Arc<dyn BlockDevice> {
    let dev = Arc::new(MemBlockDevice::new(FAT_TOTAL_SECTORS as usize));

    let mut bpb = [0u8; SECTOR_SIZE];
    bpb[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    bpb[3..11].copy_from_slice(b"DUOFS   ");
    bpb[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    bpb[13] = FAT_SECTORS_PER_CLUSTER as u8;
    bpb[14..16].copy_from_slice(&(FAT_RESERVED as u16).to_le_bytes());
    bpb[16] = FAT_NUM_FATS as u8;
    // root_ent_cnt, tot_sec16 stay 0 (FAT32 uses tot_sec32 instead)
    bpb[21] = 0xF8; // media
    // fat_sz16, sectors_per_track, num_heads, hidden_sectors stay 0
    bpb[32..36].copy_from_slice(&FAT_TOTAL_SECTORS.to_le_bytes());
    bpb[36..40].copy_from_slice(&FAT_SIZE_32.to_le_bytes());
    // ext_flags, fs_ver stay 0
    bpb[44..48].copy_from_slice(&FAT_ROOT_CLUSTER.to_le_bytes());
    bpb[48..50].copy_from_slice(&(FAT_FSINFO_SECTOR as u16).to_le_bytes());
    bpb[64] = 0x80; // drive_number
    bpb[66] = 0x29; // boot_sig
    bpb[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    bpb[71..82].copy_from_slice(b"NO NAME    ");
    bpb[82..90].copy_from_slice(b"FAT32   ");
    dev.write_sector(0, &bpb);

    let mut fsinfo = [0u8; SECTOR_SIZE];
    fsinfo[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes()); // lead_sig
    fsinfo[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes()); // struct_sig
    let total_clusters = FAT_TOTAL_SECTORS / FAT_SECTORS_PER_CLUSTER;
    fsinfo[488..492].copy_from_slice(&(total_clusters - 1).to_le_bytes()); // free_count
    fsinfo[492..496].copy_from_slice(&3u32.to_le_bytes()); // next_free
    fsinfo[508..512].copy_from_slice(&0xAA55_0000u32.to_le_bytes()); // trail_sig
    dev.write_sector(FAT_FSINFO_SECTOR, &fsinfo);

    // Root cluster (2) terminated in both FAT copies; cluster*4 == 8 lands
    // in the first sector of each copy at byte offset 8.
    for copy in 0..FAT_NUM_FATS {
        let sector = FAT_RESERVED + copy * FAT_SIZE_32;
        let mut buf = [0u8; SECTOR_SIZE];
        buf[8..12].copy_from_slice(&LAST_FAT_ENTRY.to_le_bytes());
        dev.write_sector(sector, &buf);
    }

    // Root directory cluster is left all-zero by `MemBlockDevice::new`.
    dev
}
