//! Mount configuration.
//!
//! Ground: `llenotre-maestro`'s build script loads `serde`+`toml`
//! configuration the same way; here it is a runtime mount description
//! instead of a build-time one. Per spec.md §4.4 ("A build-time choice
//! selects which engine roots `/`") and §9 (resolving the `device:/path`
//! open question), [`MountConfig`] is where that choice lives. The
//! `device:/…` prefix itself resolves against the two fixed engine names
//! (`"sfs"`, `"fat"`) in `fs/mod.rs`, not a configurable table — this crate
//! mounts at most one volume per engine (spec.md Non-goals: "multi-disk
//! mount table").

use serde::{Deserialize, Serialize};

use crate::stat::FsKind;

/// Which engine roots the boot file system (`/` with no device prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootFs {
    Sfs,
    Fat32,
}

impl From<BootFs> for FsKind {
    fn from(b: BootFs) -> Self {
        match b {
            BootFs::Sfs => FsKind::Sfs,
            BootFs::Fat32 => FsKind::Fat32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Engine that services an absolute path with no `device:/` prefix.
    pub boot_fs: BootFs,

    /// Process-wide inode cache capacity (spec.md §3: "a single fixed-size
    /// cache of in-memory inodes shared by both engines").
    #[serde(default = "default_inode_cache_slots")]
    pub inode_cache_slots: usize,

    /// Block buffer cache capacity, in sectors.
    #[serde(default = "default_buffer_cache_slots")]
    pub buffer_cache_slots: usize,
}

fn default_inode_cache_slots() -> usize {
    crate::param::NINODE
}

fn default_buffer_cache_slots() -> usize {
    crate::param::NBUF
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            boot_fs: BootFs::Sfs,
            inode_cache_slots: default_inode_cache_slots(),
            buffer_cache_slots: default_buffer_cache_slots(),
        }
    }
}

impl MountConfig {
    /// Parses a `MountConfig` from TOML text (e.g. loaded from a file at
    /// mount time). Unset fields take the defaults above.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_boot_sfs() {
        let cfg = MountConfig::default();
        assert_eq!(cfg.boot_fs, BootFs::Sfs);
        assert_eq!(cfg.inode_cache_slots, crate::param::NINODE);
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg = MountConfig::from_toml("boot_fs = \"fat32\"\n").unwrap();
        assert_eq!(cfg.boot_fs, BootFs::Fat32);
        assert_eq!(cfg.buffer_cache_slots, crate::param::NBUF);
    }
}
