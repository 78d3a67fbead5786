//! Error taxonomy of the filesystem.
//!
//! Internal code reports one of the tagged kinds below; hosts that speak
//! POSIX (a FUSE dispatcher, typically) convert with [`FsError::errno`].
//! No error is retried internally, and an operation that fails leaves the
//! region unchanged unless its documentation says otherwise.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The region cannot hold a filesystem: too small, misaligned, or the
    /// host time source failed during initialization.
    #[error("region is not a usable filesystem")]
    BadRegion,

    /// A path component does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// A directory operation was applied to a non-directory.
    #[error("not a directory")]
    NotDir,

    /// A file operation was applied to a directory.
    #[error("is a directory")]
    IsDir,

    /// Out of free blocks or free i-nodes.
    #[error("no space left in the region")]
    NoSpace,

    /// The target name already exists.
    #[error("entry already exists")]
    Exists,

    /// The directory still has entries.
    #[error("directory not empty")]
    NotEmpty,

    /// A composite operation had to be undone part-way.
    #[error("operation aborted")]
    Access,

    /// The operation is not valid for this file.
    #[error("operation not permitted")]
    NotPermitted,

    /// A host-side allocation failed.
    #[error("host allocation failed")]
    HostAlloc,
}

impl FsError {
    /// The POSIX error code a filesystem-in-userspace host should report.
    pub fn errno(self) -> libc::c_int {
        match self {
            FsError::BadRegion => libc::EFAULT,
            FsError::NotFound => libc::ENOENT,
            FsError::NotDir => libc::ENOTDIR,
            FsError::IsDir => libc::EISDIR,
            FsError::NoSpace => libc::ENOSPC,
            FsError::Exists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::Access => libc::EACCES,
            FsError::NotPermitted => libc::EPERM,
            FsError::HostAlloc => libc::EINVAL,
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
