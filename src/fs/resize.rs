//! Resize engine: grows or shrinks a regular file to an exact byte size.
//!
//! Directories are resized one block at a time by the directory engine and
//! are rejected here.  Shrinking collects every data block past the new
//! boundary, and every indirect-offset block left with no entries, by
//! walking the still-intact map, then releases the whole batch in one
//! sorted free.  Growing pre-allocates all needed data and offset blocks
//! at once and installs them only when the allocation came back complete;
//! a shortfall frees the partial batch and leaves the i-node untouched.

use log::debug;

use crate::error::{FsError, Result};
use crate::fs::alloc::{blk_alloc, blk_free};
use crate::fs::cursor::FPos;
use crate::fs::inode::{validity, Validity};
use crate::param::{BlkSet, NodeI, SzBlk, BLKSZ, NULLOFF, OFFS_BLOCK, OFFS_NODE};
use crate::region::Region;

/// Sets the byte size of the regular file at `node` to exactly `size`,
/// allocating or freeing data and indirect-offset blocks as needed.  Grown
/// space reads as zeros.  Fails on directories and when the region cannot
/// supply the missing blocks; a failed grow changes nothing.
pub fn frealloc(r: &mut Region<'_>, node: NodeI, size: u64) -> Result<()> {
    if validity(r, node) == Validity::Bad {
        return Err(FsError::NotFound);
    }
    if r.node(node).is_dir() {
        return Err(FsError::IsDir);
    }

    let new_blocks = (size + BLKSZ as u64 - 1) / BLKSZ as u64;
    let old_blocks = r.node(node).nblocks;
    let old_size = r.node(node).size;

    if new_blocks < old_blocks {
        shrink(r, node, new_blocks);
    } else if size > old_size {
        grow(r, node, new_blocks, old_blocks, old_size)?;
    }

    let n = r.node_mut(node);
    n.nblocks = new_blocks;
    n.size = size;
    Ok(())
}

/// Frees every data block from ordinal `keep` on, plus the offset blocks
/// that stop carrying entries.  The map is walked before anything is
/// released, so no header written by the allocator is ever read back as
/// map data.
fn shrink(r: &mut Region<'_>, node: NodeI, keep: SzBlk) {
    let mut doomed: Vec<BlkSet> = Vec::new();
    let (directs, blocklist) = {
        let n = r.node(node);
        (n.blocks, n.blocklist)
    };

    if keep <= OFFS_NODE as u64 {
        // The boundary falls in the direct array: the whole chain dies.
        for &b in &directs[keep as usize..] {
            if b != NULLOFF {
                doomed.push(b);
            }
        }
        collect_chain(r, blocklist, &mut doomed);
        let n = r.node_mut(node);
        for slot in &mut n.blocks[keep as usize..] {
            *slot = NULLOFF;
        }
        n.blocklist = NULLOFF;
    } else {
        let idx = keep as usize - OFFS_NODE;
        let full = idx / OFFS_BLOCK;
        let part = idx % OFFS_BLOCK;

        // Walk to the offset block holding the boundary.
        let mut prev = NULLOFF;
        let mut ob = blocklist;
        for _ in 0..full {
            prev = ob;
            ob = r.offblock(ob).next;
        }

        if part > 0 {
            // Keep the partial offset block, drop its tail and successors.
            let offs = r.offblock(ob);
            let next = offs.next;
            for &b in &offs.blocks[part..] {
                if b == NULLOFF {
                    break;
                }
                doomed.push(b);
            }
            collect_chain(r, next, &mut doomed);
            let offs = r.offblock_mut(ob);
            for slot in &mut offs.blocks[part..] {
                *slot = NULLOFF;
            }
            offs.next = NULLOFF;
        } else {
            // The boundary block keeps nothing of the chain from `ob` on;
            // `full >= 1` here, so `prev` is a real offset block.
            collect_chain(r, ob, &mut doomed);
            r.offblock_mut(prev).next = NULLOFF;
        }
    }

    blk_free(r, &mut doomed);
}

/// Pushes every data block of the chain starting at `ob`, and each offset
/// block itself, onto `doomed`.
fn collect_chain(r: &Region<'_>, mut ob: BlkSet, doomed: &mut Vec<BlkSet>) {
    while ob != NULLOFF {
        let offs = r.offblock(ob);
        for &b in offs.blocks.iter() {
            if b == NULLOFF {
                break;
            }
            doomed.push(b);
        }
        doomed.push(ob);
        ob = offs.next;
    }
}

/// Extends the map to `new_blocks` data blocks and fills the write hole at
/// the end of the old final block.
fn grow(
    r: &mut Region<'_>,
    node: NodeI,
    new_blocks: SzBlk,
    old_blocks: SzBlk,
    old_size: u64,
) -> Result<()> {
    // Zero the tail of the final block from the old size; freshly
    // allocated blocks below arrive already zeroed.
    if old_blocks > 0 && old_size % BLKSZ as u64 != 0 {
        let mut pos = FPos::load(r, node);
        pos.advance(r, old_blocks - 1);
        let from = (old_size % BLKSZ as u64) as usize;
        let blk = r.block_mut(pos.dblk);
        for b in &mut blk[from..] {
            *b = 0;
        }
    }

    let extra_data = (new_blocks - old_blocks) as usize;
    if extra_data == 0 {
        return Ok(());
    }

    // Tail of the map: the offset block (if any) and slot index where the
    // next reference goes.
    let (mut oblk, mut opos) = if old_blocks <= OFFS_NODE as u64 {
        (NULLOFF, old_blocks as usize)
    } else {
        let idx = (old_blocks - OFFS_NODE as u64) as usize;
        let tail = (idx - 1) / OFFS_BLOCK;
        let mut ob = r.node(node).blocklist;
        for _ in 0..tail {
            ob = r.offblock(ob).next;
        }
        (ob, idx - tail * OFFS_BLOCK)
    };

    let extra_offs = if oblk == NULLOFF {
        (extra_data + opos + (OFFS_BLOCK - OFFS_NODE) - 1) / OFFS_BLOCK
    } else {
        (extra_data + opos - 1) / OFFS_BLOCK
    };

    let mut fresh = vec![NULLOFF; extra_data + extra_offs];
    let got = blk_alloc(r, &mut fresh);
    if got < fresh.len() {
        debug!(
            "frealloc: need {} blocks, region had {}; rolling back",
            fresh.len(),
            got
        );
        fresh.truncate(got);
        blk_free(r, &mut fresh);
        return Err(FsError::NoSpace);
    }

    // Install: direct slots first, then the chain, linking a fresh offset
    // block whenever the current one runs out of slots.
    let mut k = 0;
    for _ in 0..extra_data {
        if oblk == NULLOFF && opos < OFFS_NODE {
            r.node_mut(node).blocks[opos] = fresh[k];
            k += 1;
            opos += 1;
        } else {
            if oblk == NULLOFF {
                let ob = fresh[k];
                k += 1;
                r.node_mut(node).blocklist = ob;
                oblk = ob;
                opos = 0;
            } else if opos == OFFS_BLOCK {
                let ob = fresh[k];
                k += 1;
                r.offblock_mut(oblk).next = ob;
                oblk = ob;
                opos = 0;
            }
            r.offblock_mut(oblk).blocks[opos] = fresh[k];
            k += 1;
            opos += 1;
        }
    }
    debug_assert_eq!(k, fresh.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use crate::testutil;

    fn setup(blocks: usize) -> (Vec<u64>, NodeI) {
        let mut buf = testutil::region_words(blocks);
        let node = {
            let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
            fs::init(&mut r).unwrap();
            testutil::mkfile(&mut r)
        };
        (buf, node)
    }

    #[test]
    fn grow_fills_direct_slots_then_chain() {
        let (mut buf, node) = setup(64);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        frealloc(&mut r, node, 3 * BLKSZ as u64).unwrap();
        {
            let n = r.node(node);
            assert_eq!(n.nblocks, 3);
            assert_eq!(n.size, 3 * BLKSZ as u64);
            assert_eq!(n.blocklist, NULLOFF);
            assert!(n.blocks[..3].iter().all(|&b| b != NULLOFF));
            assert!(n.blocks[3..].iter().all(|&b| b == NULLOFF));
        }
        testutil::check(&r);

        frealloc(&mut r, node, 9 * BLKSZ as u64).unwrap();
        {
            let n = r.node(node);
            assert_eq!(n.nblocks, 9);
            assert_ne!(n.blocklist, NULLOFF);
            let chain = r.offblock(n.blocklist);
            assert!(chain.blocks[..4].iter().all(|&b| b != NULLOFF));
            assert_eq!(chain.blocks[4], NULLOFF);
            assert_eq!(chain.next, NULLOFF);
        }
        testutil::check(&r);
    }

    #[test]
    fn grow_by_bytes_zero_fills_the_write_hole() {
        let (mut buf, node) = setup(64);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        frealloc(&mut r, node, 5).unwrap();
        let first = r.node(node).blocks[0];
        r.block_mut(first)[..5].copy_from_slice(b"stale");
        r.block_mut(first)[5..12].copy_from_slice(b"garbage");

        // Shrinking within the block leaves bytes behind; regrowing must
        // zero them out.
        frealloc(&mut r, node, 3).unwrap();
        assert_eq!(r.node(node).nblocks, 1);
        frealloc(&mut r, node, 40).unwrap();
        assert_eq!(&r.block(first)[..3], b"sta");
        assert!(r.block(first)[3..].iter().all(|&b| b == 0));
        testutil::check(&r);
    }

    #[test]
    fn truncate_to_zero_releases_direct_and_chain() {
        let (mut buf, node) = setup(64);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        let before = r.header().free;

        frealloc(&mut r, node, 20 * BLKSZ as u64).unwrap();
        assert_eq!(r.header().free, before - 21); // 20 data + 1 offset block

        frealloc(&mut r, node, 0).unwrap();
        let n = r.node(node);
        assert_eq!(n.nblocks, 0);
        assert_eq!(n.size, 0);
        assert_eq!(n.blocklist, NULLOFF);
        assert!(n.blocks.iter().all(|&b| b == NULLOFF));
        assert_eq!(r.header().free, before);
        testutil::check(&r);
    }

    #[test]
    fn shrink_keeps_partial_offset_block() {
        let (mut buf, node) = setup(64);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        frealloc(&mut r, node, 12 * BLKSZ as u64).unwrap();
        frealloc(&mut r, node, 7 * BLKSZ as u64).unwrap();

        let n = r.node(node);
        assert_eq!(n.nblocks, 7);
        let chain = r.offblock(n.blocklist);
        assert!(chain.blocks[..2].iter().all(|&b| b != NULLOFF));
        assert!(chain.blocks[2..].iter().all(|&b| b == NULLOFF));
        assert_eq!(chain.next, NULLOFF);
        testutil::check(&r);
    }

    #[test]
    fn shrink_to_exact_direct_boundary_drops_chain() {
        let (mut buf, node) = setup(64);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        let before = r.header().free;

        frealloc(&mut r, node, 8 * BLKSZ as u64).unwrap();
        frealloc(&mut r, node, 5 * BLKSZ as u64).unwrap();

        let n = r.node(node);
        assert_eq!(n.nblocks, 5);
        assert_eq!(n.blocklist, NULLOFF);
        assert_eq!(r.header().free, before - 5);
        testutil::check(&r);
    }

    #[test]
    fn failed_grow_rolls_back_and_leaves_node_alone() {
        let (mut buf, node) = setup(8); // 6 data blocks available
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        frealloc(&mut r, node, 2 * BLKSZ as u64).unwrap();
        let free_before = r.header().free;
        let node_before = *r.node(node);

        assert_eq!(
            frealloc(&mut r, node, 32 * BLKSZ as u64),
            Err(FsError::NoSpace)
        );
        assert_eq!(r.header().free, free_before);
        let n = r.node(node);
        assert_eq!(n.size, node_before.size);
        assert_eq!(n.nblocks, node_before.nblocks);
        assert_eq!(n.blocks, node_before.blocks);
        assert_eq!(n.blocklist, node_before.blocklist);
        testutil::check(&r);
    }

    #[test]
    fn directories_are_rejected() {
        let mut buf = testutil::region_words(8);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        fs::init(&mut r).unwrap();
        assert_eq!(frealloc(&mut r, 0, 0), Err(FsError::IsDir));
    }
}
