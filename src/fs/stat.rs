//! Host-facing metadata records.

use crate::fs::inode::{FileMode, TimeSpec};

/// Attributes of one file or directory, as reported by `getattr`.
#[derive(Clone, Copy, Debug)]
pub struct Attr {
    /// Owner, echoed from the caller.
    pub uid: u32,

    /// Group, echoed from the caller.
    pub gid: u32,

    /// Type and permission bits.
    pub mode: FileMode,

    /// Number of links to the node.
    pub nlink: u64,

    /// Size in bytes; directories report their entry count times the
    /// on-region entry size.
    pub size: u64,

    /// Time of last access.
    pub atime: TimeSpec,

    /// Time of last modification.
    pub mtime: TimeSpec,

    /// Creation time.
    pub ctime: TimeSpec,
}

/// Filesystem-wide usage figures, as reported by `statfs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatVfs {
    /// Block size in bytes.
    pub bsize: u64,

    /// Total blocks in the region.
    pub blocks: u64,

    /// Free blocks.
    pub bfree: u64,

    /// Free blocks available to the caller; no reservation exists, so this
    /// equals `bfree`.
    pub bavail: u64,

    /// Longest storable name, terminator excluded.
    pub namemax: u64,
}
