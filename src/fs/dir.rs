//! Directory engine.
//!
//! A directory is a file in the regular layout whose payload is a packed
//! array of fixed-size entries; its i-node `size` counts entries, not
//! bytes.  The listing is terminated by the first entry whose node is
//! NONODE; when every slot of every block is in use there is no sentinel
//! and the block map ends the scan.  Removal compacts by moving the last
//! entry into the vacated slot, so the listing never has interior holes
//! and the tail block can be released the moment it empties.
//!
//! Four operations share one traversal: lookup, insert, rename and remove.
//! Name components are compared and stored with `/` and NUL acting as
//! terminators, truncated to [`NAMELEN`]` - 1` bytes; an overlong
//! component silently collides with its truncation, as it always has in
//! this format.

use arrayvec::ArrayVec;
use log::trace;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{FsError, Result};
use crate::fs::alloc::{blk_alloc, blk_free};
use crate::fs::inode::{node_exists, validity, Validity};
use crate::param::{BlkSet, NodeI, BLKSZ, NAMELEN, NONODE, NULLOFF, OFFS_BLOCK, OFFS_NODE};
use crate::region::Region;

/// Directory entries per block.
pub const FILES_DIR: usize = BLKSZ / core::mem::size_of::<DirEntry>();

/// Size of one directory entry, in bytes.
pub const DIRENT_SIZE: usize = core::mem::size_of::<DirEntry>();

/// On-region directory entry: a node reference and a NUL-terminated name.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, AsBytes)]
pub struct DirEntry {
    /// Referenced i-node, or NONODE to mark the end of the listing.
    pub node: NodeI,
    name: [u8; NAMELEN],
}

impl DirEntry {
    /// Stores the leading component of `seg` as the entry name.  `/` and
    /// NUL terminate the component; anything past `NAMELEN - 1` bytes is
    /// dropped.
    pub fn set_name(&mut self, seg: &[u8]) {
        let len = component_len(seg);
        self.name[..len].copy_from_slice(&seg[..len]);
        self.name[len] = 0;
    }

    /// The stored name, without its terminator.
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAMELEN - 1);
        &self.name[..len]
    }

    /// Compares the stored name against the leading component of `seg`,
    /// under the same truncation as [`set_name`].
    ///
    /// [`set_name`]: DirEntry::set_name
    pub fn name_matches(&self, seg: &[u8]) -> bool {
        self.name() == &seg[..component_len(seg)]
    }
}

/// Length of the leading path component of `seg`: up to the first `/` or
/// NUL, capped at `NAMELEN - 1`.
fn component_len(seg: &[u8]) -> usize {
    let cap = seg.len().min(NAMELEN - 1);
    seg[..cap]
        .iter()
        .position(|&c| c == b'/' || c == 0)
        .unwrap_or(cap)
}

/// Traversal state over a directory's block map, kept in step with the
/// entry scan so mutation can continue where the scan stopped.  `block` is
/// the slot index within the direct array or within `oblk`; `prevo` trails
/// one offset block behind for the unlink step of removal.
struct Walk {
    oblk: BlkSet,
    prevo: BlkSet,
    dblk: BlkSet,
    block: usize,
    entry: usize,
    found: Option<(BlkSet, usize)>,
}

/// Scans `dir` for the component at the head of `name`.  The scan covers
/// the whole listing, records the first match and fails with `Exists` if
/// `reject` (a rename target) is seen anywhere.
fn walk(r: &Region<'_>, dir: NodeI, name: &[u8], reject: Option<&[u8]>) -> Result<Walk> {
    if validity(r, dir) != Validity::Linked || !r.node(dir).is_dir() {
        return Err(FsError::NotDir);
    }
    if component_len(name) == 0 {
        return Err(FsError::NotFound);
    }

    let mut w = Walk {
        oblk: NULLOFF,
        prevo: NULLOFF,
        dblk: r.node(dir).blocks[0],
        block: 0,
        entry: 0,
        found: None,
    };
    'blocks: while w.dblk != NULLOFF {
        while w.entry < FILES_DIR {
            let e = &r.dirents(w.dblk)[w.entry];
            if e.node == NONODE {
                break 'blocks;
            }
            if let Some(reject) = reject {
                if e.name_matches(reject) {
                    return Err(FsError::Exists);
                }
            }
            if w.found.is_none() && e.name_matches(name) {
                w.found = Some((w.dblk, w.entry));
            }
            w.entry += 1;
        }
        w.block += 1;
        w.entry = 0;
        if w.oblk == NULLOFF {
            if w.block == OFFS_NODE {
                w.oblk = r.node(dir).blocklist;
                if w.oblk == NULLOFF {
                    w.dblk = NULLOFF;
                } else {
                    w.block = 0;
                    w.dblk = r.offblock(w.oblk).blocks[0];
                }
            } else {
                w.dblk = r.node(dir).blocks[w.block];
            }
        } else {
            let offs = r.offblock(w.oblk);
            if w.block == OFFS_BLOCK {
                if offs.next == NULLOFF {
                    w.dblk = NULLOFF;
                } else {
                    w.prevo = w.oblk;
                    w.oblk = offs.next;
                    w.block = 0;
                    w.dblk = r.offblock(w.oblk).blocks[0];
                }
            } else {
                w.dblk = offs.blocks[w.block];
            }
        }
    }
    Ok(w)
}

/// Returns the node the entry `name` refers to.
pub fn lookup(r: &Region<'_>, dir: NodeI, name: &[u8]) -> Result<NodeI> {
    let w = walk(r, dir, name, None)?;
    match w.found {
        Some((blk, entry)) => Ok(r.dirents(blk)[entry].node),
        None => Err(FsError::NotFound),
    }
}

/// Appends an entry `name` referring to `node` and takes a link on it.
/// Fails with `Exists` if the name is present and `NoSpace` if the listing
/// needs a block the region cannot supply.
pub fn insert(r: &mut Region<'_>, dir: NodeI, name: &[u8], node: NodeI) -> Result<()> {
    if !node_exists(r, node) {
        return Err(FsError::BadRegion);
    }
    let mut w = walk(r, dir, name, None)?;
    if w.found.is_some() {
        return Err(FsError::Exists);
    }
    if w.dblk == NULLOFF {
        append_block(r, dir, &mut w)?;
    }

    let ents = r.dirents_mut(w.dblk);
    ents[w.entry].node = node;
    ents[w.entry].set_name(name);
    if w.entry + 1 < FILES_DIR {
        ents[w.entry + 1].node = NONODE;
    }
    r.node_mut(dir).size += 1;
    r.node_mut(node).nlinks += 1;
    Ok(())
}

/// Renames the entry `name` to `new_name` in place.  Fails with `Exists`
/// if `new_name` is already present (including renaming a name onto
/// itself) and `NotFound` if `name` is absent.
pub fn rename(r: &mut Region<'_>, dir: NodeI, name: &[u8], new_name: &[u8]) -> Result<NodeI> {
    if component_len(new_name) == 0 {
        return Err(FsError::NotFound);
    }
    let w = walk(r, dir, name, Some(new_name))?;
    let (blk, entry) = w.found.ok_or(FsError::NotFound)?;
    let ents = r.dirents_mut(blk);
    ents[entry].set_name(new_name);
    Ok(ents[entry].node)
}

/// Removes the entry `name`, compacting the listing by relocating the last
/// entry into the vacated slot, and drops a link from the referenced node.
/// An entry referring to a non-empty directory that would lose its only
/// link is refused; that is the rmdir guard.
pub fn remove(r: &mut Region<'_>, dir: NodeI, name: &[u8]) -> Result<NodeI> {
    let mut w = walk(r, dir, name, None)?;
    let (fblk, fentry) = w.found.ok_or(FsError::NotFound)?;
    let target = r.dirents(fblk)[fentry].node;
    {
        let t = r.node(target);
        if t.is_dir() && t.nlinks == 1 && t.size > 0 {
            return Err(FsError::NotEmpty);
        }
    }

    // Locate the last entry from where the scan stopped.
    let (lblk, lentry) = if w.dblk != NULLOFF {
        (w.dblk, w.entry - 1)
    } else {
        w.block -= 1;
        let blk = if w.oblk == NULLOFF {
            r.node(dir).blocks[w.block]
        } else {
            r.offblock(w.oblk).blocks[w.block]
        };
        (blk, FILES_DIR - 1)
    };

    let last = r.dirents(lblk)[lentry];
    r.dirents_mut(fblk)[fentry] = last;
    r.dirents_mut(lblk)[lentry].node = NONODE;

    if lentry == 0 {
        // The tail block emptied: release it, and the offset block too if
        // that was its first slot.
        let mut tail = [lblk];
        blk_free(r, &mut tail);
        if w.oblk == NULLOFF {
            r.node_mut(dir).blocks[w.block] = NULLOFF;
        } else {
            r.offblock_mut(w.oblk).blocks[w.block] = NULLOFF;
            if w.block == 0 {
                let mut chain = [w.oblk];
                blk_free(r, &mut chain);
                if w.prevo == NULLOFF {
                    r.node_mut(dir).blocklist = NULLOFF;
                } else {
                    r.offblock_mut(w.prevo).next = NULLOFF;
                }
            }
        }
        r.node_mut(dir).nblocks -= 1;
    }
    r.node_mut(dir).size -= 1;
    r.node_mut(target).nlinks -= 1;
    trace!("dir: removed entry for node {} from {}", target, dir);
    Ok(target)
}

/// Extends the listing by one data block at the scan's stopping point,
/// allocating an offset block as well when the map crosses into (or fills
/// within) the indirect chain.  Either both allocations land or neither.
fn append_block(r: &mut Region<'_>, dir: NodeI, w: &mut Walk) -> Result<()> {
    let needs_offs = (w.oblk == NULLOFF && w.block == OFFS_NODE)
        || (w.oblk != NULLOFF && w.block == OFFS_BLOCK);
    let mut fresh: ArrayVec<BlkSet, 2> = ArrayVec::new();
    for _ in 0..if needs_offs { 2 } else { 1 } {
        let mut one = [NULLOFF];
        if blk_alloc(r, &mut one) < 1 {
            blk_free(r, fresh.as_mut_slice());
            return Err(FsError::NoSpace);
        }
        fresh.push(one[0]);
    }

    if w.oblk == NULLOFF {
        if w.block == OFFS_NODE {
            let (ob, db) = (fresh[0], fresh[1]);
            r.node_mut(dir).blocklist = ob;
            let offs = r.offblock_mut(ob);
            offs.next = NULLOFF;
            offs.blocks[0] = db;
            w.oblk = ob;
            w.block = 0;
            w.dblk = db;
        } else {
            let db = fresh[0];
            r.node_mut(dir).blocks[w.block] = db;
            if w.block + 1 < OFFS_NODE {
                r.node_mut(dir).blocks[w.block + 1] = NULLOFF;
            }
            w.dblk = db;
        }
    } else if w.block == OFFS_BLOCK {
        let (ob, db) = (fresh[0], fresh[1]);
        r.offblock_mut(w.oblk).next = ob;
        let offs = r.offblock_mut(ob);
        offs.blocks[0] = db;
        w.prevo = w.oblk;
        w.oblk = ob;
        w.block = 0;
        w.dblk = db;
    } else {
        let db = fresh[0];
        let offs = r.offblock_mut(w.oblk);
        offs.blocks[w.block] = db;
        if w.block + 1 < OFFS_BLOCK {
            offs.blocks[w.block + 1] = NULLOFF;
        }
        w.dblk = db;
    }
    w.entry = 0;
    r.node_mut(dir).nblocks += 1;
    Ok(())
}
