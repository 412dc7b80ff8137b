//! Per-process file-descriptor state (spec.md §4.5 "per-process fd").
//!
//! Ground: teacher `proc.rs`'s `Proc::open_files: [Option<RcFile>; NOFILE]`
//! and `cwd: Option<RcInode>`. This crate has no scheduler or address space
//! to go with a `Proc`, so only the fd table and the working directory
//! survive, under the same fixed-capacity-array shape as the teacher uses.

use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::fs::Inode;
use crate::param::NOFILE;

/// A process's open-file table and working directory. `Vfs` is reachable
/// through `cwd` itself (an [`Inode`] carries its own `Arc<Vfs>`), so
/// syscalls that need the mount take it from `process.cwd()`.
pub struct Process {
    cwd: Inode,
    ofile: Vec<Option<Arc<File>>>,
}

impl Process {
    pub fn new(cwd: Inode) -> Self {
        Self {
            cwd,
            ofile: (0..NOFILE).map(|_| None).collect(),
        }
    }

    pub fn cwd(&self) -> &Inode {
        &self.cwd
    }

    pub fn set_cwd(&mut self, cwd: Inode) {
        self.cwd = cwd;
    }

    /// `fdalloc`: the lowest-numbered free slot, or [`FsError::TooManyOpenFiles`].
    pub fn alloc_fd(&mut self, file: Arc<File>) -> FsResult<i32> {
        let slot = self
            .ofile
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;
        self.ofile[slot] = Some(file);
        Ok(slot as i32)
    }

    pub fn get_fd(&self, fd: i32) -> FsResult<Arc<File>> {
        let slot = self.fd_slot(fd)?;
        self.ofile[slot].clone().ok_or(FsError::BadFileDescriptor)
    }

    /// `close(fd)`: drops this process's reference; the underlying `File`
    /// (and, transitively, its `Inode`) is freed once every duplicate is
    /// closed too.
    pub fn close_fd(&mut self, fd: i32) -> FsResult<()> {
        let slot = self.fd_slot(fd)?;
        if self.ofile[slot].take().is_none() {
            return Err(FsError::BadFileDescriptor);
        }
        Ok(())
    }

    /// `dup(fd)`: a second fd sharing the same `File` (and its offset
    /// cursor), matching the teacher's `filedup`.
    pub fn dup_fd(&mut self, fd: i32) -> FsResult<i32> {
        let file = self.get_fd(fd)?;
        self.alloc_fd(file)
    }

    fn fd_slot(&self, fd: i32) -> FsResult<usize> {
        if fd < 0 || fd as usize >= self.ofile.len() {
            return Err(FsError::BadFileDescriptor);
        }
        Ok(fd as usize)
    }
}
