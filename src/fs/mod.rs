//! On-region filesystem layout and initialization.
//!
//! Region layout:
//! [ header | i-node table ........ | free regions / file data /
//!                                    indirect-offset blocks / directory data ]
//!
//! The header occupies the first i-node slot, so the node table effectively
//! starts one slot past the region base and the root directory is node 0.
//! Block 0 therefore always falls inside the table, which is what lets a
//! zero block index act as the null sentinel everywhere else.

use core::mem;

use log::debug;
use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{FsError, Result};
use crate::fs::alloc::FreeReg;
use crate::fs::inode::{FileMode, Inode, TimeSpec, NODES_BLOCK};
use crate::param::{BlkSet, NodeI, Offset, SzBlk, BLKSZ, BLOCKS_FILE, NULLOFF};
use crate::region::Region;

pub mod alloc;
pub mod cursor;
pub mod dir;
pub mod inode;
pub mod path;
pub mod resize;
pub mod stat;

/// Global filesystem header, stored at offset 0 of the region.
///
/// `size` doubles as the initialization marker: a region whose header block
/// count does not match the mapped size is (re)initialized from scratch, so
/// a zeroed region reads as uninitialized and a remapped dump of the same
/// size is recognized as-is.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, AsBytes)]
pub struct FsHeader {
    /// Size of the filesystem, in blocks; 0 while uninitialized.
    pub size: SzBlk,

    /// Number of free blocks.
    pub free: SzBlk,

    /// First free region, or NULLOFF when the region is exactly full.
    pub freelist: BlkSet,

    /// Blocks occupied by the i-node table (header included).
    pub ntsize: SzBlk,

    /// Byte offset of the i-node table.
    pub nodetbl: Offset,
}

// The header must fit in the slot the table reserves for it.
const_assert!(mem::size_of::<FsHeader>() <= mem::size_of::<Inode>());

impl FsHeader {
    /// Number of usable i-node slots (the header consumes one).
    pub fn node_count(&self) -> NodeI {
        (self.ntsize as usize * NODES_BLOCK) as NodeI - 1
    }
}

/// Prepares the region for use; idempotent.
///
/// A region already carrying a filesystem of the mapped size is left
/// untouched.  Anything else is formatted: the node table is sized so that
/// files averaging [`BLOCKS_FILE`] data blocks exhaust nodes and blocks
/// together, a single free region covers all remaining blocks, and the root
/// directory is installed empty at node 0.
pub fn init(r: &mut Region<'_>) -> Result<()> {
    let total = r.total_blocks();
    if r.header().size == total {
        return Ok(());
    }
    let now = TimeSpec::now().ok_or(FsError::BadRegion)?;

    let per = 1 + BLOCKS_FILE * NODES_BLOCK;
    let ntsize =
        (BLOCKS_FILE as u64 * (1 + NODES_BLOCK as u64) + total + per as u64 - 1) / per as u64;
    let free = total.saturating_sub(ntsize);
    debug!(
        "init: formatting {} blocks, node table {} blocks, {} free",
        total, ntsize, free
    );

    {
        let h = r.header_mut();
        h.ntsize = ntsize;
        h.nodetbl = mem::size_of::<Inode>() as Offset;
        h.free = free;
        h.freelist = if free > 0 { ntsize } else { NULLOFF };
    }
    if free > 0 {
        r.set_freereg(
            ntsize,
            FreeReg {
                size: free,
                next: NULLOFF,
            },
        );
    }

    r.zero_bytes(
        mem::size_of::<Inode>(),
        ntsize as usize * BLKSZ - mem::size_of::<Inode>(),
    );
    {
        let root = r.node_mut(0);
        root.mode = FileMode::DIRMODE.bits();
        root.nlinks = 1;
        root.atime = now;
        root.mtime = now;
        root.ctime = now;
    }

    // Committing the size last is what flips the region to "initialized".
    r.header_mut().size = total;
    Ok(())
}
