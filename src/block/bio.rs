//! Buffer cache.
//!
//! Ground: teacher `bio.rs` ("Caching disk blocks in memory reduces the
//! number of disk reads and also provides a synchronization point for disk
//! blocks used by multiple processes... To get a buffer call read. After
//! changing data call write. When done, release."). The teacher's cache
//! pins live buffers behind a sleeplock per slot and a disk-owns-it flag;
//! we simplify to a fixed-capacity, write-through LRU of owned sector
//! copies, since this crate treats a real write-back policy as the block
//! device's own concern (spec.md §2: "a write-back flag... the core
//! consumes this interface") rather than something to reimplement here.
//! `Buf` plays the role of a pinned, acquired buffer; dropping it is
//! `brelse`.

use std::sync::{Arc, Mutex};

use crate::block::device::BlockDevice;
use crate::param::SECTOR_SIZE;

#[derive(Clone)]
pub struct Buf {
    pub dev: u32,
    pub sector: u32,
    pub data: [u8; SECTOR_SIZE],
}

impl Buf {
    pub fn zeroed(dev: u32, sector: u32) -> Self {
        Self {
            dev,
            sector,
            data: [0u8; SECTOR_SIZE],
        }
    }
}

/// A fixed-capacity, write-through buffer cache in front of one
/// [`BlockDevice`].
pub struct BufCache {
    device: Arc<dyn BlockDevice>,
    capacity: usize,
    slots: Mutex<Vec<Buf>>,
}

impl BufCache {
    pub fn new(device: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        Self {
            device,
            capacity: capacity.max(1),
            slots: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// `bread`: returns the sector's contents, pulling from the device on a
    /// cache miss. May "sleep" (block the OS thread) while the device
    /// services the read — the one suspension point spec.md §5 names for
    /// this layer.
    pub fn read(&self, dev: u32, sector: u32) -> Buf {
        let mut slots = self.slots.lock().expect("buf cache: poisoned");
        if let Some(pos) = slots.iter().position(|b| b.dev == dev && b.sector == sector) {
            let buf = slots.remove(pos);
            slots.push(buf.clone());
            return buf;
        }
        drop(slots);
        let mut data = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut data);
        let buf = Buf { dev, sector, data };
        self.insert(buf.clone());
        buf
    }

    /// `bwrite`: writes the buffer through to the device and refreshes the
    /// cached copy.
    pub fn write(&self, buf: &Buf) {
        self.device.write_sector(buf.sector, &buf.data);
        self.insert(buf.clone());
    }

    fn insert(&self, buf: Buf) {
        let mut slots = self.slots.lock().expect("buf cache: poisoned");
        if let Some(pos) = slots.iter().position(|b| b.dev == buf.dev && b.sector == buf.sector) {
            slots[pos] = buf;
            return;
        }
        if slots.len() >= self.capacity {
            slots.remove(0);
        }
        slots.push(buf);
    }
}
