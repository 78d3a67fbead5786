//! File position cursor.
//!
//! One cursor type walks the block map of any linked i-node, at byte
//! granularity for regular files and entry granularity for directories.
//! Directory listing, directory mutation, read, write and truncation all
//! traverse through it instead of re-implementing the direct-slots /
//! offset-chain walk.
//!
//! A cursor is a read-only view: it borrows the region only while moving
//! and owns none of the blocks it points at.  Field meanings, including the
//! end-of-file encodings, are:
//!
//! * `node == NONODE`: the cursor is invalid;
//! * `oblk == NULLOFF`: the current block reference lives in the i-node's
//!   direct array, otherwise in the offset block at `oblk`;
//! * `dblk == NULLOFF`: the file is empty;
//! * `data == NULLOFF`: at end of file (or the file is empty); when the
//!   final block is exactly full, `opos`/`dpos` rest one past its last
//!   slot and are stepped back before the next whole-block advance.

use crate::param::{BlkSet, NodeI, Offset, SzBlk, BLKSZ, NONODE, NULLOFF, OFFS_BLOCK, OFFS_NODE};
use crate::region::Region;

use super::inode::{validity, Validity};

/// Position within a file or directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FPos {
    /// File the cursor is bound to, NONODE if invalid.
    pub node: NodeI,

    /// Ordinal of the current block within the file.
    pub nblk: SzBlk,

    /// Offset block holding the current block reference, NULLOFF while the
    /// reference is one of the i-node's direct slots.
    pub oblk: BlkSet,

    /// Index of the current block reference within `oblk` or the direct
    /// array.
    pub opos: usize,

    /// Current data block, NULLOFF for an empty file.
    pub dblk: BlkSet,

    /// Position within the current block: bytes for files, entries for
    /// directories.
    pub dpos: usize,

    /// Byte offset of the current datum, NULLOFF at end of file.
    pub data: Offset,
}

impl FPos {
    /// Cursor at the first datum of `node`; invalid if `node` is not a
    /// usable slot.
    pub fn load(r: &Region<'_>, node: NodeI) -> FPos {
        if validity(r, node) == Validity::Bad {
            return FPos {
                node: NONODE,
                nblk: 0,
                oblk: NULLOFF,
                opos: 0,
                dblk: NULLOFF,
                dpos: 0,
                data: NULLOFF,
            };
        }
        let dblk = r.node(node).blocks[0];
        FPos {
            node,
            nblk: 0,
            oblk: NULLOFF,
            opos: 0,
            dblk,
            dpos: 0,
            data: dblk * BLKSZ as u64,
        }
    }

    /// Moves forward by up to `blks` whole blocks, landing at position 0 of
    /// the block reached.  Returns the number of blocks actually advanced;
    /// stops early at the end of the map.
    pub fn advance(&mut self, r: &Region<'_>, mut blks: SzBlk) -> SzBlk {
        if self.node == NONODE || self.dblk == NULLOFF {
            return 0;
        }
        let unit = r.node(self.node).unit();
        if self.data == NULLOFF && self.dpos * unit == BLKSZ {
            // Seek past a full final block parked opos one slot beyond;
            // step back onto the real slot before walking on.
            self.opos -= 1;
        }
        self.dpos = 0;

        let mut adv = 0;
        while blks > 0 {
            let mut opos = self.opos + 1;
            if self.oblk == NULLOFF {
                if opos == OFFS_NODE {
                    self.oblk = r.node(self.node).blocklist;
                    if self.oblk == NULLOFF {
                        break;
                    }
                    opos = 0;
                    self.dblk = r.offblock(self.oblk).blocks[0];
                } else {
                    if r.node(self.node).blocks[opos] == NULLOFF {
                        break;
                    }
                    self.dblk = r.node(self.node).blocks[opos];
                }
            } else {
                let next = r.offblock(self.oblk).next;
                if opos == OFFS_BLOCK {
                    if next == NULLOFF {
                        break;
                    }
                    self.oblk = next;
                    opos = 0;
                    self.dblk = r.offblock(self.oblk).blocks[0];
                } else {
                    if r.offblock(self.oblk).blocks[opos] == NULLOFF {
                        break;
                    }
                    self.dblk = r.offblock(self.oblk).blocks[opos];
                }
            }
            self.opos = opos;
            adv += 1;
            blks -= 1;
        }
        self.data = self.dblk * BLKSZ as u64;
        self.nblk += adv;
        adv
    }

    /// Moves forward by up to `off` items: bytes in a file, entries in a
    /// directory.  Whole-block distance is covered through [`advance`];
    /// reaching the declared size parks the cursor at end of file
    /// (`data == NULLOFF`).  Returns the net advancement in items.
    ///
    /// [`advance`]: FPos::advance
    pub fn seek(&mut self, r: &Region<'_>, mut off: u64) -> u64 {
        if self.node == NONODE || self.data == NULLOFF {
            return 0;
        }
        let unit = r.node(self.node).unit();
        let size = r.node(self.node).size;
        let per_block = (BLKSZ / unit) as u64;

        let mut adv = 0;
        let mut bck = 0;
        let blks = (off + self.dpos as u64) * unit as u64 / BLKSZ as u64;
        if blks > 0 {
            off = (off + self.dpos as u64) % per_block;
            bck = self.dpos as u64;
            let moved = self.advance(r, blks);
            if moved < blks {
                // Map ended early: walk the final block out to its end so
                // the loop below parks at end of file.
                off = per_block;
            }
            adv = moved * per_block;
        }
        while self.data != NULLOFF && off > 0 {
            self.dpos += 1;
            if self.nblk * per_block + self.dpos as u64 == size {
                if self.dpos as u64 == per_block {
                    self.opos += 1;
                }
                self.data = NULLOFF;
            } else {
                self.data = self.dblk * BLKSZ as u64 + (self.dpos * unit) as u64;
                adv += 1;
                off -= 1;
            }
        }
        adv - bck
    }
}
