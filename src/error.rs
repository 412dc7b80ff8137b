//! File system error kinds.
//!
//! Ground: spec.md §7 splits errors into non-fatal ones (surfaced to the
//! caller) and fatal ones (on-disk inconsistency, resource exhaustion),
//! which the original kernel handles with `panic()`. We keep that split:
//! `FsError` covers only the non-fatal kinds; the fatal kinds stay as
//! `panic!`/`unreachable!` calls at their point of detection, matching the
//! teacher's `assert!`/`panic!` style in `fs/mod.rs` and `fs/inode.rs`.

use thiserror::Error;

/// Non-fatal errors a syscall can observe and return to its caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("file name too long")]
    NameTooLong,

    #[error("file already exists")]
    AlreadyExists,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("file system is read-only for this operation")]
    ReadOnly,

    #[error("operation not supported by this file system")]
    Unsupported,

    #[error("path exceeds buffer capacity")]
    PathOverflow,

    #[error("cross-device link")]
    CrossDevice,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("bad file descriptor")]
    BadFileDescriptor,

    #[error("permission denied")]
    PermissionDenied,
}

pub type FsResult<T> = Result<T, FsError>;
