//! Persistent filesystem inside a single memory region.  Five layers:
//!   + Region: typed, offset-addressed views over the host byte slice.
//!   + Blocks: allocator over a sorted free-list of extents.
//!   + Files: i-node table, block maps, a cursor for walking them, resizing.
//!   + Directories: files whose payload is a packed array of entries.
//!   + Names: paths like /usr/share/doc resolved component by component.
//!
//! The region is self-describing: every cross-reference inside it is a block
//! index or a byte offset from the region base, never a native pointer, so a
//! host may unmap the region, dump it to backing storage, map it again later
//! and keep using the filesystem without reinitialization.
//!
//! The host serializes all calls; there is no locking in the region and none
//! in this crate.  Each operation takes the region slice explicitly and
//! returns before the next may start.

pub mod error;
pub mod fs;
pub mod ops;
pub mod param;
pub mod region;

pub use crate::error::{FsError, Result};
pub use crate::fs::inode::{FileMode, TimeSpec};
pub use crate::fs::path::Path;
pub use crate::fs::stat::{Attr, StatVfs};
pub use crate::ops::{
    getattr, mkdir, mknod, open, read, readdir, rename, rmdir, statfs, truncate, unlink, utimens,
    write,
};

#[cfg(test)]
pub(crate) mod testutil;
