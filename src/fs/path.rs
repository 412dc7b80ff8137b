//! Pathname parsing: `skipelem`, the `device:/path` prefix, and the fixed
//! buffers path elements are copied into.
//!
//! Ground: teacher `fs/path.rs`'s `Path`/`FileName` pair. The teacher wraps
//! a borrowed, NUL-free byte slice behind `#[repr(transparent)]` newtypes
//! built for a `no_std`, raw-pointer-from-userspace world. Syscall argument
//! marshalling is out of scope here (spec.md §1), so callers already hold a
//! plain `&str`; this module keeps `skipelem`'s behavior and naming but
//! drops the unsafe transparent-slice machinery.

use std::cmp;

use crate::param::{DIRSIZ, FAT_DIRSIZ};

/// A `/`-separated path, borrowed from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path<'a> {
    inner: &'a str,
}

impl<'a> Path<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { inner: s }
    }

    pub fn as_str(&self) -> &'a str {
        self.inner
    }

    pub fn is_absolute(&self) -> bool {
        self.inner.starts_with('/')
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns `(remaining, name)` where `name` is the next path element and
    /// `remaining` has no leading slashes — the caller checks
    /// `remaining.is_empty()` to see if `name` was the last element.
    /// Returns `None` if there is no name left to remove (ground:
    /// teacher `Path::skipelem`).
    pub fn skipelem(&self) -> Option<(Path<'a>, &'a str)> {
        let bytes = self.inner.as_bytes();

        let name_start = bytes.iter().position(|&c| c != b'/')?;
        let rest = &bytes[name_start..];

        let len = rest.iter().position(|&c| c == b'/').unwrap_or(rest.len());
        let name = &rest[..len];

        let after_name = &rest[len..];
        let next_start = after_name
            .iter()
            .position(|&c| c != b'/')
            .unwrap_or(after_name.len());

        // SAFETY-free: all three subslices were cut on UTF-8 boundaries,
        // since `/` is a single ASCII byte.
        let name = std::str::from_utf8(name).expect("path: non-UTF-8 element");
        let remaining = std::str::from_utf8(&after_name[next_start..]).expect("path: non-UTF-8");

        Some((Path::new(remaining), name))
    }
}

/// The result of splitting an optional `device:/…` prefix off a path
/// (spec.md §4.4, §9). Resolved per SPEC_FULL.md §4.4: scan for `:` before
/// the first `/`.
pub struct DevicePrefix<'a> {
    pub device: Option<&'a str>,
    pub rest: Path<'a>,
}

/// Splits a leading `device:` prefix off `path`, if one is present before
/// the first `/`. A bare leading `/` with no colon, or a relative path,
/// carries no device and is resolved against the boot filesystem or `cwd`
/// respectively by the caller.
pub fn split_device_prefix(path: &str) -> DevicePrefix<'_> {
    let slash = path.find('/').unwrap_or(path.len());
    match path[..slash].find(':') {
        Some(colon) if colon > 0 => DevicePrefix {
            device: Some(&path[..colon]),
            rest: Path::new(&path[colon + 1..]),
        },
        _ => DevicePrefix {
            device: None,
            rest: Path::new(path),
        },
    }
}

/// Copies `name` into a fixed-size element buffer, truncating to the
/// engine's element limit (spec.md §4.4: `DIRSIZ` for SFS, `FAT_DIRSIZ` for
/// FAT; "overflow truncates to the buffer size").
pub fn truncate_element(name: &str, limit: usize) -> &str {
    let limit = cmp::min(limit, name.len());
    // Never split a UTF-8 code point.
    let mut end = limit;
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

pub fn truncate_sfs_element(name: &str) -> &str {
    truncate_element(name, DIRSIZ)
}

pub fn truncate_fat_element(name: &str) -> &str {
    truncate_element(name, FAT_DIRSIZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipelem_basic() {
        let (rest, name) = Path::new("a/bb/c").skipelem().unwrap();
        assert_eq!(name, "a");
        assert_eq!(rest.as_str(), "bb/c");

        let (rest, name) = rest.skipelem().unwrap();
        assert_eq!(name, "bb");
        assert_eq!(rest.as_str(), "c");
    }

    #[test]
    fn skipelem_collapses_slashes() {
        let (rest, name) = Path::new("///a//bb").skipelem().unwrap();
        assert_eq!(name, "a");
        assert_eq!(rest.as_str(), "bb");
    }

    #[test]
    fn skipelem_last_component() {
        let (rest, name) = Path::new("a").skipelem().unwrap();
        assert_eq!(name, "a");
        assert!(rest.is_empty());
    }

    #[test]
    fn skipelem_empty_or_all_slashes() {
        assert!(Path::new("").skipelem().is_none());
        assert!(Path::new("////").skipelem().is_none());
    }

    #[test]
    fn device_prefix_is_split_before_first_slash() {
        let p = split_device_prefix("fat:/a/b");
        assert_eq!(p.device, Some("fat"));
        assert_eq!(p.rest.as_str(), "/a/b");
    }

    #[test]
    fn no_colon_before_slash_means_no_device() {
        let p = split_device_prefix("/a:b/c");
        assert_eq!(p.device, None);
        assert_eq!(p.rest.as_str(), "/a:b/c");
    }

    #[test]
    fn relative_path_has_no_device() {
        let p = split_device_prefix("a/b");
        assert_eq!(p.device, None);
        assert_eq!(p.rest.as_str(), "a/b");
    }
}
