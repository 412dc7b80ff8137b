//! FAT32 directory entries: 32-byte `DIR` (short) and `LDIR` (long-name
//! fragment) slots sharing one union (spec.md §3).
//!
//! Ground: `original_source/xv6/fs/fat32/fat_inode.h`'s `struct DIR`/`struct
//! LDIR`, and `fat_getDIRType`'s classification switch.

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;
pub const ATTR_LONG_NAME_MASK: u8 = 0x3F;

pub const LAST_LONG_ENTRY: u8 = 0x40;

pub const ENTRY_EMPTY: u8 = 0x00;
pub const ENTRY_DELETED: u8 = 0xE5;

/// Short (8.3) directory entry, 32 bytes. FAT32's on-disk format is
/// specified little-endian regardless of host, so every multi-byte field is
/// a `zerocopy::little_endian` wrapper instead of a native-endian primitive
/// (ground: `valaphee-hyrax`'s `DirEntry`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dir {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_res: u8,
    pub crt_time_tenth: u8,
    pub crt_time: U16,
    pub crt_date: U16,
    pub lst_acc_date: U16,
    pub fst_clus_hi: U16,
    pub wrt_time: U16,
    pub wrt_date: U16,
    pub fst_clus_lo: U16,
    pub file_size: U32,
}

impl Dir {
    pub fn first_cluster(&self) -> u32 {
        ((self.fst_clus_hi.get() as u32) << 16) | self.fst_clus_lo.get() as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.fst_clus_hi = U16::new((cluster >> 16) as u16);
        self.fst_clus_lo = U16::new(cluster as u16);
    }
}

/// Long-name fragment entry, 32 bytes, sharing the slot layout with `Dir`
/// at the `Attr`/`Ord` positions. The name fragments are UTF-16 code units,
/// stored little-endian like every other multi-byte FAT32 field.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LongDir {
    pub ord: u8,
    pub name1: [U16; 5],
    pub attr: u8,
    pub typ: u8,
    pub chksum: u8,
    pub name2: [U16; 6],
    pub fst_clus_lo: U16,
    pub name3: [U16; 2],
}

impl LongDir {
    pub fn name_units(&self) -> [u16; 13] {
        let mut out = [0u16; 13];
        for (i, u) in self.name1.iter().chain(self.name2.iter()).chain(self.name3.iter()).enumerate() {
            out[i] = u.get();
        }
        out
    }

    pub fn from_name_units(ord: u8, last: bool, chksum: u8, units: &[u16; 13]) -> Self {
        let name1: [u16; 5] = units[..5].try_into().unwrap();
        let name2: [u16; 6] = units[5..11].try_into().unwrap();
        let name3: [u16; 2] = units[11..13].try_into().unwrap();
        Self {
            ord: if last { ord | LAST_LONG_ENTRY } else { ord },
            name1: name1.map(U16::new),
            attr: ATTR_LONG_NAME,
            typ: 0,
            chksum,
            name2: name2.map(U16::new),
            fst_clus_lo: U16::new(0),
            name3: name3.map(U16::new),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Empty,
    EndOfDirectory,
    LongName,
    Dir,
    File,
    VolumeLabel,
}

/// `fat_getDIRType`: classifies a raw 32-byte slot by its `Ord`/`Attr`
/// bytes (the first byte and the 12th byte of either flavor, since `DIR`
/// and `LDIR` share layout up to that point).
pub fn classify(raw: &[u8; 32]) -> EntryKind {
    let first = raw[0];
    let attr = raw[11];
    if first == ENTRY_DELETED {
        return EntryKind::Empty;
    }
    if first == ENTRY_EMPTY {
        return EntryKind::EndOfDirectory;
    }
    if attr & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
        return EntryKind::LongName;
    }
    match attr & (ATTR_DIRECTORY | ATTR_VOLUME_ID) {
        0 => EntryKind::File,
        ATTR_DIRECTORY => EntryKind::Dir,
        ATTR_VOLUME_ID => EntryKind::VolumeLabel,
        _ => EntryKind::Empty,
    }
}

pub const DIR_ENTRY_SIZE: usize = 32;

pub fn dir_from_bytes(raw: &[u8; 32]) -> Dir {
    Dir::read_from_bytes(raw).expect("fat: DIR bytes malformed")
}

pub fn long_dir_from_bytes(raw: &[u8; 32]) -> LongDir {
    LongDir::read_from_bytes(raw).expect("fat: LDIR bytes malformed")
}
