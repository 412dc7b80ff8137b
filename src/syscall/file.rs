//! File-system system calls (spec.md §4.5).
//!
//! Ground: teacher `sysfile.rs`'s `sys_open`/`sys_link`/`sys_unlink`/
//! `sys_mkdir`/`sys_pipe`/etc. The teacher fetches arguments out of user
//! memory first (`argstr`/`argint`/`argfd`); that marshalling step is an
//! external collaborator here (spec.md §1), so every syscall below takes
//! already-validated native arguments and calls straight into [`Vfs`].

use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::fcntl::OpenFlags;
use crate::file::File;
use crate::fs::path::Path;
use crate::fs::{Inode, Vfs};
use crate::proc::Process;
use crate::stat::{FileKind, Stat};

/// `open(path, omode)`.
pub fn open(vfs: &Arc<Vfs>, process: &mut Process, path: &str, omode: OpenFlags) -> FsResult<i32> {
    let ip = vfs.open(path, omode, process.cwd())?;
    let file = Arc::new(File::from_inode(ip, omode.readable(), omode.writable()));
    process.alloc_fd(file)
}

/// `close(fd)`.
pub fn close(process: &mut Process, fd: i32) -> FsResult<()> {
    process.close_fd(fd)
}

/// `read(fd, buf)`.
pub fn read(vfs: &Arc<Vfs>, process: &Process, fd: i32, buf: &mut [u8]) -> FsResult<usize> {
    let file = process.get_fd(fd)?;
    file.read(vfs, buf)
}

/// `write(fd, buf)`.
pub fn write(vfs: &Arc<Vfs>, process: &Process, fd: i32, buf: &[u8]) -> FsResult<usize> {
    let file = process.get_fd(fd)?;
    file.write(vfs, buf)
}

/// `dup(fd)`: a second fd sharing the same file-table entry.
pub fn dup(process: &mut Process, fd: i32) -> FsResult<i32> {
    process.dup_fd(fd)
}

/// `pipe()`: allocates a pipe and a read/write fd pair for it.
pub fn pipe(process: &mut Process) -> FsResult<(i32, i32)> {
    let (read_end, write_end) = File::pipe_pair();
    let read_fd = process.alloc_fd(Arc::new(read_end))?;
    match process.alloc_fd(Arc::new(write_end)) {
        Ok(write_fd) => Ok((read_fd, write_fd)),
        Err(e) => {
            process.close_fd(read_fd).ok();
            Err(e)
        }
    }
}

/// `fstat(fd)`.
pub fn fstat(process: &Process, fd: i32) -> FsResult<Stat> {
    process.get_fd(fd)?.stat()
}

/// `link(old, new)`: SFS only (spec.md §4.5).
pub fn link(vfs: &Arc<Vfs>, process: &Process, old: &str, new: &str) -> FsResult<()> {
    vfs.link(old, new, process.cwd())
}

/// `unlink(path)`.
pub fn unlink(vfs: &Arc<Vfs>, process: &Process, path: &str) -> FsResult<()> {
    vfs.unlink(path, process.cwd())
}

/// `mkdir(path)`.
pub fn mkdir(vfs: &Arc<Vfs>, process: &Process, path: &str) -> FsResult<()> {
    vfs.create(path, FileKind::Dir, 0, 0, process.cwd())?;
    Ok(())
}

/// `mknod(path, major, minor)`.
pub fn mknod(vfs: &Arc<Vfs>, process: &Process, path: &str, major: u16, minor: u16) -> FsResult<()> {
    vfs.create(path, FileKind::Dev, major, minor, process.cwd())?;
    Ok(())
}

/// `chdir(path)`.
pub fn chdir(vfs: &Arc<Vfs>, process: &mut Process, path: &str) -> FsResult<()> {
    let ip = vfs.lookup(path, process.cwd())?;
    if ip.typ() != FileKind::Dir {
        return Err(FsError::NotADirectory);
    }
    process.set_cwd(ip);
    Ok(())
}

/// `getcwd()`.
pub fn getcwd(vfs: &Arc<Vfs>, process: &Process) -> FsResult<String> {
    vfs.getcwd(process.cwd())
}

/// `touch(path)`: ensures a regular file exists at `path`, creating an
/// empty one if absent. `create` already returns the existing file when
/// `path` names one, so this is `create` with the result dropped.
pub fn touch(vfs: &Arc<Vfs>, process: &Process, path: &str) -> FsResult<()> {
    vfs.create(path, FileKind::File, 0, 0, process.cwd())?;
    Ok(())
}

/// The final path element, for [`copy`]'s "append basename of `src`" rule.
fn basename(path: &str) -> &str {
    let mut p = Path::new(path);
    let mut last = "";
    while let Some((rest, name)) = p.skipelem() {
        last = name;
        p = rest;
    }
    last
}

/// `copy(src, dst)`: `src` must be a regular file. If `dst` names an
/// existing directory, the destination becomes `dst/basename(src)`
/// (spec.md §4.5).
pub fn copy(vfs: &Arc<Vfs>, process: &Process, src: &str, dst: &str) -> FsResult<()> {
    let src_ip = vfs.lookup(src, process.cwd())?;
    if src_ip.typ() != FileKind::File {
        return Err(FsError::InvalidArgument);
    }
    let (src_major, src_minor) = (src_ip.major(), src_ip.minor());

    let dst_owned;
    let dst = match vfs.lookup(dst, process.cwd()) {
        Ok(existing) if existing.typ() == FileKind::Dir => {
            dst_owned = format!("{dst}/{}", basename(src));
            dst_owned.as_str()
        }
        _ => dst,
    };

    let dst_ip = vfs.create(dst, FileKind::File, src_major, src_minor, process.cwd())?;
    stream_copy(vfs, &src_ip, &dst_ip)
}

fn stream_copy(vfs: &Arc<Vfs>, src: &Inode, dst: &Inode) -> FsResult<()> {
    let mut buf = [0u8; 512];
    let mut off = 0u32;
    loop {
        let n = vfs.read(src, off, &mut buf);
        if n == 0 {
            break;
        }
        let written = vfs.write(dst, off, &buf[..n])?;
        assert_eq!(written, n, "copy: short write");
        off += n as u32;
    }
    Ok(())
}

/// `move(src, dst)`: [`copy`] followed by `unlink(src)` (spec.md §4.5).
pub fn move_(vfs: &Arc<Vfs>, process: &Process, src: &str, dst: &str) -> FsResult<()> {
    copy(vfs, process, src, dst)?;
    unlink(vfs, process, src)
}

/// `remove(path)`: recursive delete of a directory tree, SFS only — the
/// FAT side is explicitly unimplemented (spec.md §4.5).
pub fn remove(vfs: &Arc<Vfs>, process: &Process, path: &str) -> FsResult<()> {
    let ip = vfs.lookup(path, process.cwd())?;
    if ip.typ() == FileKind::Dir {
        for (name, child) in vfs.list_dir(&ip)? {
            let child_path = format!("{path}/{name}");
            if child.typ() == FileKind::Dir {
                remove(vfs, process, &child_path)?;
            } else {
                unlink(vfs, process, &child_path)?;
            }
        }
    }
    unlink(vfs, process, path)
}
