//! VFS dispatch (spec.md §2 layer 5, §4.4).
//!
//! Ground: teacher `fs/mod.rs`'s `FileSystem` and `fs/inode.rs`'s
//! `Inode`/`InodeGuard` pair. The teacher dispatches through a single
//! concrete engine; this crate's `Vfs` holds up to two mounted engines and
//! dispatches on each inode's own `FsKind` tag (spec.md §9: "prefer a sum
//! type `Inode { Sfs(..), Fat(..) }`"), since `ialloc`/`getpath`/etc. are
//! only implemented by one engine each.

mod fat;
pub mod inode;
pub mod path;
mod sfs;

use std::sync::Arc;

use log::{trace, warn};

use crate::block::BlockDevice;
use crate::config::MountConfig;
use crate::devsw::DeviceSwitch;
use crate::error::{FsError, FsResult};
use crate::fcntl::OpenFlags;
use crate::lock::SleeplockGuard;
use crate::stat::{FileKind, FsKind, Stat};

use fat::FatEngine;
use inode::{ICache, InodePayload, InodeState};
use path::{split_device_prefix, truncate_fat_element, truncate_sfs_element, Path};
use sfs::SfsEngine;

/// The mounted device a path's `device:` prefix (or lack of one) resolves
/// to (spec.md §4.4 "Boot filesystem").
const SFS_DEVICE_NAME: &str = "sfs";
const FAT_DEVICE_NAME: &str = "fat";

/// One mounted volume's on-disk dev number. This crate mounts at most one
/// SFS and one FAT32 volume (spec.md Non-goals: "multi-disk mount table").
const SFS_DEV: u32 = 0;
const FAT_DEV: u32 = 1;

/// The virtual file system: the inode cache plus whichever engines are
/// mounted (spec.md §4.4).
pub struct Vfs {
    icache: ICache,
    sfs: Option<SfsEngine>,
    fat: Option<FatEngine>,
    devsw: Arc<dyn DeviceSwitch>,
    boot_fs: FsKind,
}

impl Vfs {
    /// Mounts engines per `config`. `sfs_device`/`fat_device` are `None` when
    /// that engine isn't part of this build's mount set; at least the boot
    /// engine's device must be present.
    pub fn mount(
        config: &MountConfig,
        sfs_device: Option<Arc<dyn BlockDevice>>,
        fat_device: Option<Arc<dyn BlockDevice>>,
        devsw: Arc<dyn DeviceSwitch>,
    ) -> Arc<Self> {
        let boot_fs: FsKind = config.boot_fs.into();
        let sfs = sfs_device.map(|d| SfsEngine::mount(d, SFS_DEV, config.buffer_cache_slots));
        let fat = fat_device.map(|d| FatEngine::mount(d, FAT_DEV, config.buffer_cache_slots));

        match boot_fs {
            FsKind::Sfs => assert!(sfs.is_some(), "vfs: boot fs is sfs but no sfs device given"),
            FsKind::Fat32 => assert!(fat.is_some(), "vfs: boot fs is fat32 but no fat device given"),
        }

        trace!("vfs: mounted (boot_fs = {boot_fs:?}, sfs = {}, fat = {})", sfs.is_some(), fat.is_some());

        Arc::new(Self {
            icache: ICache::new(config.inode_cache_slots),
            sfs,
            fat,
            devsw,
            boot_fs,
        })
    }

    fn sfs(&self) -> &SfsEngine {
        self.sfs.as_ref().expect("vfs: sfs not mounted")
    }

    fn fat(&self) -> &FatEngine {
        self.fat.as_ref().expect("vfs: fat not mounted")
    }

    fn root_for(&self, fskind: FsKind) -> (u32, u32) {
        match fskind {
            FsKind::Sfs => (SFS_DEV, self.sfs().root_inum()),
            FsKind::Fat32 => (FAT_DEV, self.fat().root_inum()),
        }
    }

    /// `get_root`: a cached inode reference for `fskind`'s root.
    pub fn get_root(self: &Arc<Self>, fskind: FsKind) -> Inode {
        let (dev, inum) = self.root_for(fskind);
        let slot = self.icache.get(fskind, dev, inum);
        Inode { vfs: self.clone(), slot }
    }

    fn root_for_device(self: &Arc<Self>, device: Option<&str>) -> FsResult<FsKind> {
        match device {
            None => Ok(self.boot_fs),
            Some(SFS_DEVICE_NAME) if self.sfs.is_some() => Ok(FsKind::Sfs),
            Some(FAT_DEVICE_NAME) if self.fat.is_some() => Ok(FsKind::Fat32),
            Some(_) => Err(FsError::NotFound),
        }
    }

    /// `namei`: resolves `path` to its leaf inode, starting from `cwd` for a
    /// relative path with no device prefix (spec.md §4.4 "lookup").
    pub fn lookup(self: &Arc<Self>, path: &str, cwd: &Inode) -> FsResult<Inode> {
        let prefix = split_device_prefix(path);
        let mut cur = if prefix.device.is_some() || prefix.rest.is_absolute() {
            let fskind = self.root_for_device(prefix.device)?;
            self.get_root(fskind)
        } else {
            cwd.dup()
        };

        let mut rest = prefix.rest;
        loop {
            let Some((next, name)) = rest.skipelem() else {
                return Ok(cur);
            };
            rest = next;

            let mut guard = cur.lock();
            if guard.payload.typ() != FileKind::Dir {
                return Err(FsError::NotADirectory);
            }
            let found = self.dirlookup_locked(&cur, &guard, name)?;
            drop(guard);
            cur = found;
        }
    }

    /// `nameiparent`: like [`Vfs::lookup`] but stops one component early,
    /// returning the parent and the final element's name.
    pub fn lookup_parent<'a>(self: &Arc<Self>, path: &'a str, cwd: &Inode) -> FsResult<(Inode, &'a str)> {
        let prefix = split_device_prefix(path);
        let mut cur = if prefix.device.is_some() || prefix.rest.is_absolute() {
            let fskind = self.root_for_device(prefix.device)?;
            self.get_root(fskind)
        } else {
            cwd.dup()
        };

        let mut rest = prefix.rest;
        loop {
            let Some((next, name)) = rest.skipelem() else {
                return Err(FsError::InvalidArgument);
            };
            if next.is_empty() {
                return Ok((cur, name));
            }

            let mut guard = cur.lock();
            if guard.payload.typ() != FileKind::Dir {
                return Err(FsError::NotADirectory);
            }
            let found = self.dirlookup_locked(&cur, &guard, name)?;
            drop(guard);
            cur = found;
            rest = next;
        }
    }

    fn dirlookup_locked(self: &Arc<Self>, ip: &Inode, guard: &InodeStateGuard<'_>, name: &str) -> FsResult<Inode> {
        let (fskind, dev, dir_inum) = self.icache.identity(ip.slot);
        let found = match fskind {
            FsKind::Sfs => self.sfs().dirlookup(&guard.payload, truncate_sfs_element(name)),
            FsKind::Fat32 => self.fat().dirlookup(&guard.payload, dir_inum, truncate_fat_element(name)),
        };
        let (inum, _off) = found.ok_or(FsError::NotFound)?;
        let slot = self.icache.get(fskind, dev, inum);
        Ok(Inode { vfs: self.clone(), slot })
    }

    /// `getcwd`: repeatedly walks `..`, recovering each step's name via a
    /// reverse scan of the parent, prepending as it goes (spec.md §4.4).
    pub fn getcwd(self: &Arc<Self>, cwd: &Inode) -> FsResult<String> {
        let (fskind, ..) = self.icache.identity(cwd.slot);
        let mut components: Vec<String> = Vec::new();
        let mut cur = cwd.dup();

        loop {
            let guard = cur.lock();
            let (_, _, inum) = self.icache.identity(cur.slot);
            let (_, _, root_inum) = self.icache.identity(self.get_root(fskind).slot);
            if inum == root_inum {
                drop(guard);
                break;
            }

            let parent = self.dirlookup_locked(&cur, &guard, "..")?;
            drop(guard);

            let parent_guard = parent.lock();
            let name = self.reverse_lookup_name(&parent, &parent_guard, inum)?;
            drop(parent_guard);

            components.push(name);
            cur = parent;
        }

        let prefix = match fskind {
            FsKind::Sfs => format!("{SFS_DEVICE_NAME}:"),
            FsKind::Fat32 => format!("{FAT_DEVICE_NAME}:"),
        };
        let mut out = prefix;
        out.push('/');
        for c in components.iter().rev() {
            out.push_str(c);
            out.push('/');
        }
        if components.len() > 1 {
            out.pop();
        }
        if out.len() > crate::param::MAXPATH {
            return Err(FsError::PathOverflow);
        }
        Ok(out)
    }

    fn reverse_lookup_name(self: &Arc<Self>, parent: &Inode, guard: &InodeStateGuard<'_>, child_inum: u32) -> FsResult<String> {
        let (fskind, _, parent_inum) = self.icache.identity(parent.slot);
        match fskind {
            FsKind::Sfs => self
                .sfs()
                .dirlookup_name_by_inum(&guard.payload, child_inum)
                .ok_or(FsError::NotFound),
            FsKind::Fat32 => self
                .fat()
                .dirlookup_name_by_inum(parent_inum, child_inum)
                .ok_or(FsError::NotFound),
        }
    }

    /// `create(path, typ, major, minor)`: resolves the parent, rejects an
    /// existing name, allocates a fresh inode via the parent's engine, and
    /// links it in (spec.md §4.5 `open`/`mkdir`/`mknod`).
    pub fn create(self: &Arc<Self>, path: &str, typ: FileKind, major: u16, minor: u16, cwd: &Inode) -> FsResult<Inode> {
        let (dir, name) = self.lookup_parent(path, cwd)?;
        let mut dguard = dir.lock();
        if dguard.payload.typ() != FileKind::Dir {
            return Err(FsError::NotADirectory);
        }

        let (fskind, dev, dir_inum) = self.icache.identity(dir.slot);

        if let Ok(found) = self.dirlookup_locked(&dir, &dguard, name) {
            drop(dguard);
            if typ == FileKind::File && found.typ() == FileKind::File {
                return Ok(found);
            }
            return Err(FsError::AlreadyExists);
        }

        let new_inum = match fskind {
            FsKind::Sfs => {
                let name = truncate_sfs_element(name);
                let inum = self.sfs().ialloc(typ);
                self.sfs().dirlink(&mut dguard.payload, name, inum)?;
                if typ == FileKind::Dir {
                    // The child's `..` points back here, so the parent's
                    // nlink is bumped (§9 Open Question 2); the child's own
                    // `.`/`..` entries are written once its own inode is
                    // locked below.
                    dguard.payload.as_sfs_mut().nlink += 1;
                }
                inum
            }
            FsKind::Fat32 => {
                let name = truncate_fat_element(name);
                let is_dir = typ == FileKind::Dir;
                let inum = self.fat().alloc_first_cluster();
                self.fat().dirlink(&dguard.payload, dir_inum, name, inum, is_dir)?;
                inum
            }
        };

        self.sync_dir_inode(fskind, dev, dir_inum, &dguard.payload);
        drop(dguard);

        let slot = self.icache.get(fskind, dev, new_inum);
        {
            let mut guard = self.icache.lock_content(slot);
            guard.payload = match fskind {
                FsKind::Sfs => self.sfs().read_inode(new_inum),
                FsKind::Fat32 => self.fat().read_inode(new_inum),
            };
            guard.valid = true;
            if fskind == FsKind::Sfs {
                let p = guard.payload.as_sfs_mut();
                p.typ = typ;
                p.major = major;
                p.minor = minor;
                p.nlink = 1;
                if typ == FileKind::Dir {
                    self.sfs().dirlink(&mut guard.payload, ".", new_inum)?;
                    self.sfs().dirlink(&mut guard.payload, "..", dir_inum)?;
                }
                self.sfs().update_inode(new_inum, &guard.payload);
            }
        }

        Ok(Inode { vfs: self.clone(), slot })
    }

    fn sync_dir_inode(&self, fskind: FsKind, _dev: u32, dir_inum: u32, payload: &InodePayload) {
        match fskind {
            FsKind::Sfs => self.sfs().update_inode(dir_inum, payload),
            FsKind::Fat32 => {} // FAT directory size is an in-memory hint only (§9).
        }
    }

    /// `unlink(path)`: refuses `.`/`..`, refuses a non-empty directory,
    /// decrements `nlink`, and relies on [`Inode::drop`] to free storage
    /// once the last reference is released.
    pub fn unlink(self: &Arc<Self>, path: &str, cwd: &Inode) -> FsResult<()> {
        let (dir, name) = self.lookup_parent(path, cwd)?;
        if name == "." || name == ".." {
            return Err(FsError::PermissionDenied);
        }

        let mut dguard = dir.lock();
        let (_, _, dir_inum) = self.icache.identity(dir.slot);
        let target = self.dirlookup_locked(&dir, &dguard, name)?;
        let (fskind, _dev, inum) = self.icache.identity(target.slot);

        let mut tguard = target.lock();
        if tguard.payload.typ() == FileKind::Dir && !self.isdirempty_locked(fskind, inum, &tguard) {
            return Err(FsError::DirectoryNotEmpty);
        }

        match fskind {
            FsKind::Sfs => {
                let name = truncate_sfs_element(name);
                self.sfs().unlink_entry(&mut dguard.payload, name)?;
                let nlink = tguard.payload.nlink() - 1;
                tguard.payload.set_nlink(nlink);
                self.sfs().update_inode(inum, &tguard.payload);
                if tguard.payload.typ() == FileKind::Dir {
                    dguard.payload.as_sfs_mut().nlink -= 1;
                }
                self.sfs().update_inode(dir_inum, &dguard.payload);
            }
            FsKind::Fat32 => {
                let name = truncate_fat_element(name);
                self.fat().remove_entry(dir_inum, name)?;
                tguard.payload.set_nlink(0);
            }
        }

        drop(tguard);
        drop(dguard);
        Ok(())
    }

    fn isdirempty_locked(&self, fskind: FsKind, inum: u32, guard: &InodeStateGuard<'_>) -> bool {
        match fskind {
            FsKind::Sfs => self.sfs().isdirempty(&guard.payload),
            FsKind::Fat32 => self.fat().isdirempty(inum),
        }
    }

    /// `link(old, new)`: SFS only (spec.md §4.5). Increments `nlink` before
    /// linking the new name in, rolling the increment back if `dirlink`
    /// fails (spec.md §7 "Recoverable rollbacks").
    pub fn link(self: &Arc<Self>, old: &str, new: &str, cwd: &Inode) -> FsResult<()> {
        let src = self.lookup(old, cwd)?;
        let (fskind, _, src_inum) = self.icache.identity(src.slot);
        if fskind != FsKind::Sfs {
            return Err(FsError::Unsupported);
        }

        {
            let guard = src.lock();
            if guard.payload.typ() == FileKind::Dir {
                return Err(FsError::IsADirectory);
            }
        }

        let _txn = self.sfs().begin_transaction();

        {
            let mut guard = src.lock();
            let nlink = guard.payload.nlink() + 1;
            guard.payload.set_nlink(nlink);
            self.sfs().update_inode(src_inum, &guard.payload);
        }

        // Undoes the nlink increment above unless `defuse`d once the new
        // name is successfully linked in (spec.md §7 "recoverable
        // rollbacks"), the same shape as the teacher's `scopeguard::guard`
        // use in `pipe.rs` for freeing a partially-built allocation.
        let rollback = scopeguard::guard((), |_| {
            warn!("vfs: link: rolling back nlink increment on inode {src_inum}");
            let mut guard = src.lock();
            let nlink = guard.payload.nlink() - 1;
            guard.payload.set_nlink(nlink);
            self.sfs().update_inode(src_inum, &guard.payload);
        });

        let (dir, name) = self.lookup_parent(new, cwd)?;

        let mut dguard = dir.lock();
        let (dfskind, _, _) = self.icache.identity(dir.slot);
        if dfskind != fskind {
            return Err(FsError::CrossDevice);
        }

        let name = truncate_sfs_element(name);
        self.sfs().dirlink(&mut dguard.payload, name, src_inum)?;
        let (_, _, dir_inum) = self.icache.identity(dir.slot);
        self.sfs().update_inode(dir_inum, &dguard.payload);

        scopeguard::ScopeGuard::into_inner(rollback);
        Ok(())
    }

    /// `open`: `O_CREATE` goes through [`Vfs::create`]; otherwise
    /// [`Vfs::lookup`], rejecting writable opens of a FAT directory (spec.md
    /// §9 Open Question 3: directories may still be opened read-only on both
    /// engines).
    pub fn open(self: &Arc<Self>, path: &str, flags: OpenFlags, cwd: &Inode) -> FsResult<Inode> {
        if flags.creates() {
            return self.create(path, FileKind::File, 0, 0, cwd);
        }

        let ip = self.lookup(path, cwd)?;
        let guard = ip.lock();
        if guard.payload.typ() == FileKind::Dir && flags.writable() {
            return Err(FsError::IsADirectory);
        }
        Ok(ip.clone_ref())
    }

    /// `fstat`.
    pub fn stat(&self, ip: &Inode) -> Stat {
        let (fskind, dev, inum) = self.icache.identity(ip.slot);
        let guard = ip.lock();
        Stat {
            typ: guard.payload.typ(),
            dev,
            ino: inum,
            nlink: guard.payload.nlink(),
            size: guard.payload.size() as u64,
            fstype: fskind,
        }
    }

    /// `read(ip, off, dst)`.
    pub fn read(&self, ip: &Inode, off: u32, dst: &mut [u8]) -> usize {
        let (fskind, _, inum) = self.icache.identity(ip.slot);
        let guard = ip.lock();
        if guard.payload.typ() == FileKind::Dev {
            return self.devsw.read(guard.payload.major(), guard.payload.minor(), dst);
        }
        match fskind {
            FsKind::Sfs => self.sfs().read(&guard.payload, off, dst),
            FsKind::Fat32 => self.fat().read(&guard.payload, inum, off, dst),
        }
    }

    /// `write(ip, off, src)`.
    pub fn write(&self, ip: &Inode, off: u32, src: &[u8]) -> FsResult<usize> {
        let (fskind, _, inum) = self.icache.identity(ip.slot);
        let mut guard = ip.lock();
        if guard.payload.typ() == FileKind::Dev {
            return Ok(self.devsw.write(guard.payload.major(), guard.payload.minor(), src));
        }
        let n = match fskind {
            FsKind::Sfs => self.sfs().write(&mut guard.payload, off, src)?,
            FsKind::Fat32 => self.fat().write(&mut guard.payload, inum, off, src)?,
        };
        match fskind {
            FsKind::Sfs => self.sfs().update_inode(inum, &guard.payload),
            FsKind::Fat32 => self.fat().update_inode(inum, &guard.payload),
        }
        Ok(n)
    }

    /// `isdirempty(d)`.
    pub fn isdirempty(&self, ip: &Inode) -> bool {
        let (fskind, _, inum) = self.icache.identity(ip.slot);
        let guard = ip.lock();
        self.isdirempty_locked(fskind, inum, &guard)
    }

    /// Every non-`.`/`..` entry directly under `d` as `(name, child)` pairs
    /// (spec.md §4.5 `remove`, SFS only per its Non-goal on the FAT side).
    pub fn list_dir(self: &Arc<Self>, d: &Inode) -> FsResult<Vec<(String, Inode)>> {
        let (fskind, dev, _) = self.icache.identity(d.slot);
        if fskind != FsKind::Sfs {
            return Err(FsError::Unsupported);
        }
        let guard = d.lock();
        if guard.payload.typ() != FileKind::Dir {
            return Err(FsError::NotADirectory);
        }
        let entries = self.sfs().list_entries(&guard.payload);
        drop(guard);
        Ok(entries
            .into_iter()
            .map(|(name, inum)| {
                let slot = self.icache.get(fskind, dev, inum);
                (name, Inode { vfs: self.clone(), slot })
            })
            .collect())
    }
}

type InodeStateGuard<'a> = SleeplockGuard<'a, InodeState>;

/// A live reference to a cached inode (spec.md §3 "cache refcount").
/// `Clone` is `idup`; `Drop` is `iput`.
pub struct Inode {
    vfs: Arc<Vfs>,
    slot: usize,
}

impl Inode {
    fn dup(&self) -> Inode {
        self.vfs.icache.dup(self.slot);
        Inode { vfs: self.vfs.clone(), slot: self.slot }
    }

    /// Like [`Inode::clone`] but named for the `open` call site (spec.md
    /// §4.5: each successful `open` hands back its own reference).
    fn clone_ref(&self) -> Inode {
        self.dup()
    }

    /// `ilock`: blocks until the slot's content lock is free, filling
    /// `VALID` payload from disk on first lock (spec.md §4.1).
    pub fn lock(&self) -> InodeStateGuard<'_> {
        let mut guard = self.vfs.icache.lock_content(self.slot);
        if !guard.valid {
            let (fskind, _, inum) = self.vfs.icache.identity(self.slot);
            guard.payload = match fskind {
                FsKind::Sfs => self.vfs.sfs().read_inode(inum),
                FsKind::Fat32 => self.vfs.fat().read_inode(inum),
            };
            guard.valid = true;
            trace!("inode: filled payload for slot {}", self.slot);
        }
        guard
    }

    pub fn typ(&self) -> FileKind {
        self.lock().payload.typ()
    }

    pub fn major(&self) -> u16 {
        self.lock().payload.major()
    }

    pub fn minor(&self) -> u16 {
        self.lock().payload.minor()
    }

    pub fn stat(&self) -> Stat {
        self.vfs.stat(self)
    }
}

impl Clone for Inode {
    fn clone(&self) -> Self {
        self.dup()
    }
}

impl Drop for Inode {
    /// `iput`: on drop-to-zero with `VALID` and `nlink == 0`, truncates and
    /// frees on-disk storage (spec.md §3 invariants, §4.1 `iput`).
    fn drop(&mut self) {
        let remaining = self.vfs.icache.dec_ref(self.slot);
        if remaining > 0 {
            return;
        }

        let (fskind, _, inum) = self.vfs.icache.identity(self.slot);
        {
            let mut guard = self.vfs.icache.lock_content(self.slot);
            if guard.valid && guard.payload.nlink() == 0 {
                match fskind {
                    FsKind::Sfs => {
                        self.vfs.sfs().truncate(&mut guard.payload);
                        self.vfs.sfs().update_inode(inum, &guard.payload);
                    }
                    FsKind::Fat32 => {
                        self.vfs.fat().truncate(&mut guard.payload, inum);
                    }
                }
                guard.payload.set_typ(FileKind::None);
            }
            // Always invalidate before the slot can be recycled for a
            // different identity (spec.md §4.1 `iput`): a slot freed with
            // `valid` still set would hand the next occupant stale payload.
            guard.valid = false;
        }
        self.vfs.icache.free_slot(self.slot);
    }
}
