//! Open-file table entries (spec.md §4.5 `open`/`pipe`; spec.md §6
//! "device switch").
//!
//! Ground: teacher `file.rs`'s `File{typ: FileType, readable, writable}`
//! with `FileType::{Pipe, Inode, Device}`. Kept the same three-way split;
//! `Device` collapses into `Inode` here since [`crate::fs::Vfs::read`] and
//! [`crate::fs::Vfs::write`] already forward `T_DEV` inodes to the device
//! switch themselves, so a `File` never needs to special-case it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::fs::{Inode, Vfs};
use crate::lock::{Spinlock, WaitChannel};
use crate::stat::Stat;

/// Fixed-capacity ring buffer backing an anonymous pipe, sized the way the
/// teacher's `pipe.rs` sizes `PipeInner::data` (`PIPESIZE = 512`).
const PIPESIZE: usize = 512;

struct PipeInner {
    data: [u8; PIPESIZE],
    nread: usize,
    nwrite: usize,
    read_open: bool,
    write_open: bool,
}

/// An anonymous pipe (spec.md §4.5 `pipe`). Not a file system construct —
/// it never touches an engine or the inode cache — but it shares the
/// `File` table the way the teacher's `pipe.rs` shares `ftable`.
pub struct Pipe {
    inner: Spinlock<PipeInner>,
    read_chan: WaitChannel,
    write_chan: WaitChannel,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Spinlock::new(PipeInner {
                data: [0; PIPESIZE],
                nread: 0,
                nwrite: 0,
                read_open: true,
                write_open: true,
            }),
            read_chan: WaitChannel::new(),
            write_chan: WaitChannel::new(),
        })
    }

    fn read(&self, dst: &mut [u8]) -> FsResult<usize> {
        let mut inner = self.inner.lock();
        while inner.nread == inner.nwrite && inner.write_open {
            inner = self.read_chan.sleep(inner);
        }
        let mut n = 0;
        while n < dst.len() && inner.nread < inner.nwrite {
            dst[n] = inner.data[inner.nread % PIPESIZE];
            inner.nread += 1;
            n += 1;
        }
        self.write_chan.wakeup();
        Ok(n)
    }

    fn write(&self, src: &[u8]) -> FsResult<usize> {
        let mut inner = self.inner.lock();
        if !inner.read_open {
            return Err(FsError::BadFileDescriptor);
        }
        let mut n = 0;
        while n < src.len() {
            while inner.nwrite - inner.nread == PIPESIZE {
                if !inner.read_open {
                    return Err(FsError::BadFileDescriptor);
                }
                self.read_chan.wakeup();
                inner = self.write_chan.sleep(inner);
            }
            inner.data[inner.nwrite % PIPESIZE] = src[n];
            inner.nwrite += 1;
            n += 1;
        }
        self.read_chan.wakeup();
        Ok(n)
    }

    fn close(&self, writable: bool) {
        let mut inner = self.inner.lock();
        if writable {
            inner.write_open = false;
            self.read_chan.wakeup();
        } else {
            inner.read_open = false;
            self.write_chan.wakeup();
        }
    }
}

enum FileKind {
    Inode { ip: Inode, off: AtomicU32 },
    Pipe { pipe: Arc<Pipe> },
}

/// An open-file-table entry: an [`Inode`]/offset pair or a pipe end, plus
/// the readable/writable bits fixed at `open`/`pipe` time (spec.md §4.5:
/// "readable iff not `O_WRONLY`; writable iff `O_WRONLY` or `O_RDWR`").
pub struct File {
    kind: FileKind,
    readable: bool,
    writable: bool,
}

impl File {
    pub fn from_inode(ip: Inode, readable: bool, writable: bool) -> Self {
        Self {
            kind: FileKind::Inode { ip, off: AtomicU32::new(0) },
            readable,
            writable,
        }
    }

    /// `pipe()`: allocates one shared buffer and hands back its two ends.
    pub fn pipe_pair() -> (File, File) {
        let pipe = Pipe::new();
        let read_end = File {
            kind: FileKind::Pipe { pipe: pipe.clone() },
            readable: true,
            writable: false,
        };
        let write_end = File {
            kind: FileKind::Pipe { pipe },
            readable: false,
            writable: true,
        };
        (read_end, write_end)
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// `fstat`: only inode-backed files carry metadata.
    pub fn stat(&self) -> FsResult<Stat> {
        match &self.kind {
            FileKind::Inode { ip, .. } => Ok(ip.stat()),
            FileKind::Pipe { .. } => Err(FsError::InvalidArgument),
        }
    }

    pub fn read(&self, vfs: &Vfs, dst: &mut [u8]) -> FsResult<usize> {
        if !self.readable {
            return Err(FsError::BadFileDescriptor);
        }
        match &self.kind {
            FileKind::Inode { ip, off } => {
                let cur = off.load(Ordering::Relaxed);
                let n = vfs.read(ip, cur, dst);
                off.fetch_add(n as u32, Ordering::Relaxed);
                Ok(n)
            }
            FileKind::Pipe { pipe } => pipe.read(dst),
        }
    }

    pub fn write(&self, vfs: &Vfs, src: &[u8]) -> FsResult<usize> {
        if !self.writable {
            return Err(FsError::BadFileDescriptor);
        }
        match &self.kind {
            FileKind::Inode { ip, off } => {
                let cur = off.load(Ordering::Relaxed);
                let n = vfs.write(ip, cur, src)?;
                off.fetch_add(n as u32, Ordering::Relaxed);
                Ok(n)
            }
            FileKind::Pipe { pipe } => pipe.write(src),
        }
    }
}

impl Drop for File {
    /// Closing the last reference to a pipe end marks that end closed so
    /// the other end observes EOF/`BadFileDescriptor` instead of blocking
    /// forever (spec.md §5 "resource model").
    fn drop(&mut self) {
        if let FileKind::Pipe { pipe } = &self.kind {
            pipe.close(self.writable);
        }
    }
}
