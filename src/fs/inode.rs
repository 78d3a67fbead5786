//! I-nodes.
//!
//! An i-node describes a single file or directory: its mode, link count,
//! size, timestamps and the map of data blocks holding its content.  The
//! first [`OFFS_NODE`] data block references live directly in the i-node;
//! beyond that the map continues in a singly-linked chain of
//! indirect-offset blocks ([`OffBlock`]).
//!
//! The table is a fixed array sized at initialization, laid out
//! sequentially from the header slot onward.  A slot goes through three
//! states over its life:
//!
//! * unset: mode is zero, the slot has never carried a file;
//! * unlinked: mode is set but no directory references it (link count 0),
//!   which is how a slot looks between removal and reuse;
//! * linked: mode is set and at least one directory entry points at it.
//!
//! [`new_node`] recycles the first slot that is unlinked *and* has an empty
//! block map, so a file whose data release is still pending is never handed
//! out.  Callers fill in mode and timestamps before linking the node; the
//! validity predicate treats a slot without a mode as dead.

use core::mem;

use bitflags::bitflags;
use static_assertions::{const_assert, const_assert_eq};
use zerocopy::{AsBytes, FromBytes};

use crate::fs::dir::DIRENT_SIZE;
use crate::param::{BlkSet, NodeI, SzBlk, BLKSZ, NONODE, NULLOFF, OFFS_BLOCK, OFFS_NODE};
use crate::region::Region;

/// I-nodes per table block.
pub const NODES_BLOCK: usize = BLKSZ / mem::size_of::<Inode>();

bitflags! {
    /// Mode word of an i-node: one type bit plus the fixed 0755 permissions.
    /// An all-zero word marks a slot that has never been linked.
    pub struct FileMode: u64 {
        const PERM = 0o755;
        const REG = 0o100_000;
        const DIR = 0o040_000;
        const FILEMODE = Self::REG.bits | Self::PERM.bits;
        const DIRMODE = Self::DIR.bits | Self::PERM.bits;
    }
}

/// Seconds and nanoseconds since the Unix epoch, stored as two words.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, FromBytes, AsBytes)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    /// Current time from the host clock, or `None` if the clock is unusable
    /// (reports a time before the epoch).
    pub fn now() -> Option<TimeSpec> {
        let d = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?;
        Some(TimeSpec {
            sec: d.as_secs() as i64,
            nsec: d.subsec_nanos() as i64,
        })
    }
}

/// On-region i-node: 16 words.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, AsBytes)]
pub struct Inode {
    /// [`FileMode`] bits; zero while the slot is unset.
    pub mode: u64,

    /// Number of directory entries referring to this node.
    pub nlinks: u64,

    /// Size in bytes for regular files, in entries for directories.
    pub size: u64,

    /// Data blocks reachable through the map; offset blocks not counted.
    pub nblocks: SzBlk,

    /// Time of last access.
    pub atime: TimeSpec,

    /// Time of last modification.
    pub mtime: TimeSpec,

    /// Creation time.
    pub ctime: TimeSpec,

    /// Direct references to the first data blocks; entries past the last
    /// are NULLOFF.
    pub blocks: [BlkSet; OFFS_NODE],

    /// First indirect-offset block, or NULLOFF.
    pub blocklist: BlkSet,
}

const_assert_eq!(mem::size_of::<Inode>(), 16 * mem::size_of::<u64>());
const_assert!(NODES_BLOCK > 0);

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode == FileMode::DIRMODE.bits()
    }

    pub fn is_file(&self) -> bool {
        self.mode == FileMode::FILEMODE.bits()
    }

    /// Granularity of positions within this file: bytes for regular files,
    /// whole entries for directories.
    pub fn unit(&self) -> usize {
        if self.is_dir() {
            DIRENT_SIZE
        } else {
            1
        }
    }
}

/// A block holding the continuation of a file's block map.
#[repr(C)]
#[derive(FromBytes, AsBytes)]
pub struct OffBlock {
    /// Next offset block in the chain, or NULLOFF.
    pub next: BlkSet,

    /// Data block references; entries past the last are NULLOFF.
    pub blocks: [BlkSet; OFFS_BLOCK],
}

/// Validity of an i-node index, ordered so that range checks read naturally.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Validity {
    /// Out of table range, or the slot has no mode set.
    Bad,
    /// A real file or directory slot, not necessarily linked anywhere.
    Good,
    /// Linked from at least one directory.
    Linked,
}

pub fn validity(r: &Region<'_>, node: NodeI) -> Validity {
    if node < 0 || node >= r.header().node_count() {
        return Validity::Bad;
    }
    let n = r.node(node);
    if n.mode != FileMode::FILEMODE.bits() && n.mode != FileMode::DIRMODE.bits() {
        return Validity::Bad;
    }
    if n.nlinks == 0 {
        Validity::Good
    } else {
        Validity::Linked
    }
}

/// Finds the first reusable slot, scanning upward from index 1 (the root
/// never turns over).  The slot's size and map fields are reset so the
/// caller receives an empty file; returns `None` when the table is full.
pub fn new_node(r: &mut Region<'_>) -> Option<NodeI> {
    let count = r.header().node_count();
    for i in 1..count {
        let n = r.node(i);
        if n.nlinks == 0 && n.blocks[0] == NULLOFF {
            let n = r.node_mut(i);
            n.size = 0;
            n.nblocks = 0;
            n.blocks = [NULLOFF; OFFS_NODE];
            n.blocklist = NULLOFF;
            return Some(i);
        }
    }
    None
}

/// True when `node` names a slot that a directory entry may reference.
pub fn node_exists(r: &Region<'_>, node: NodeI) -> bool {
    node != NONODE && validity(r, node) != Validity::Bad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use crate::testutil;

    #[test]
    fn fresh_table_hands_out_consecutive_nodes() {
        let mut buf = testutil::region_words(8);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        fs::init(&mut r).unwrap();

        assert_eq!(new_node(&mut r), Some(1));
        // Not yet linked, so the same slot is offered again.
        assert_eq!(new_node(&mut r), Some(1));

        r.node_mut(1).mode = FileMode::FILEMODE.bits();
        r.node_mut(1).nlinks = 1;
        assert_eq!(new_node(&mut r), Some(2));
    }

    #[test]
    fn exhausted_table_returns_none() {
        let mut buf = testutil::region_words(8);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        fs::init(&mut r).unwrap();

        let count = r.header().node_count();
        for i in 1..count {
            let n = r.node_mut(i);
            n.mode = FileMode::FILEMODE.bits();
            n.nlinks = 1;
        }
        assert_eq!(new_node(&mut r), None);
    }

    #[test]
    fn validity_tracks_mode_and_links() {
        let mut buf = testutil::region_words(8);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        fs::init(&mut r).unwrap();

        assert_eq!(validity(&r, 0), Validity::Linked);
        assert_eq!(validity(&r, 1), Validity::Bad); // unset mode
        assert_eq!(validity(&r, -1), Validity::Bad);
        assert_eq!(validity(&r, r.header().node_count()), Validity::Bad);

        r.node_mut(1).mode = FileMode::FILEMODE.bits();
        assert_eq!(validity(&r, 1), Validity::Good);
        r.node_mut(1).nlinks = 2;
        assert_eq!(validity(&r, 1), Validity::Linked);
    }
}
