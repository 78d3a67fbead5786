//! Shared helpers for the unit tests: word-aligned region buffers and a
//! structural checker for the cross-operation invariants.

use std::collections::BTreeSet;

use itertools::Itertools;
use zerocopy::AsBytes;

use crate::fs::dir::FILES_DIR;
use crate::fs::inode::{new_node, validity, FileMode, Validity};
use crate::param::{BlkSet, NodeI, BLKSZ, NONODE, NULLOFF, OFFS_NODE};
use crate::region::Region;

/// Backing store for a test region: `u64` words keep the base aligned the
/// way a real mapping would be.
pub(crate) fn region_words(blocks: usize) -> Vec<u64> {
    vec![0u64; blocks * BLKSZ / core::mem::size_of::<u64>()]
}

pub(crate) fn region_bytes(words: &mut [u64]) -> &mut [u8] {
    words.as_bytes_mut()
}

/// Installs a linked regular file at the first free node, bypassing the
/// directory layer, for tests that exercise the file layers alone.
pub(crate) fn mkfile(r: &mut Region<'_>) -> NodeI {
    let node = new_node(r).expect("node table full");
    let n = r.node_mut(node);
    n.mode = FileMode::FILEMODE.bits();
    n.nlinks = 1;
    node
}

/// Asserts every structural invariant of the region:
/// each data-area block owned exactly once, free list sorted and
/// non-adjacent, block counts and sizes consistent, root linked.
pub(crate) fn check(r: &Region<'_>) {
    let h = r.header();
    assert_eq!(h.size, r.total_blocks(), "header size mismatch");
    let ntsize = h.ntsize;
    let total = h.size;

    // Free list: in range, sorted, non-adjacent, sizes positive.
    let mut free_blocks: Vec<(BlkSet, u64)> = Vec::new();
    let mut at = h.freelist;
    while at != NULLOFF {
        let fr = r.freereg(at);
        assert!(fr.size > 0, "zero-size free region at {}", at);
        assert!(at >= ntsize && at + fr.size <= total, "free region out of range");
        free_blocks.push((at, fr.size));
        at = fr.next;
    }
    for ((a, asz), (b, _)) in free_blocks.iter().tuple_windows() {
        assert!(a < b, "free list not sorted");
        assert!(a + asz < *b, "adjacent free regions not merged");
    }
    let free_total: u64 = free_blocks.iter().map(|(_, s)| s).sum();
    assert_eq!(free_total, h.free, "free-block count out of sync");

    // Every linked node's map: distinct blocks, counts consistent.
    let mut owned: BTreeSet<BlkSet> = BTreeSet::new();
    let mut claim = |b: BlkSet| {
        assert!(b >= ntsize && b < total, "map references block {}", b);
        assert!(owned.insert(b), "block {} owned twice", b);
    };
    assert_eq!(validity(r, 0), Validity::Linked, "root not linked");
    assert!(r.node(0).is_dir(), "root not a directory");

    for node in 0..h.node_count() {
        if validity(r, node) != Validity::Linked {
            continue;
        }
        let n = r.node(node);
        let mut data = Vec::new();
        let mut seen_null = false;
        for &b in &n.blocks {
            if b == NULLOFF {
                seen_null = true;
            } else {
                assert!(!seen_null, "direct array has a gap");
                data.push(b);
            }
        }
        let mut ob = n.blocklist;
        assert!(
            ob == NULLOFF || data.len() == OFFS_NODE,
            "chain present with free direct slots"
        );
        while ob != NULLOFF {
            claim(ob);
            let offs = r.offblock(ob);
            let mut seen_null = false;
            for &b in offs.blocks.iter() {
                if b == NULLOFF {
                    seen_null = true;
                } else {
                    assert!(!seen_null, "offset block has a gap");
                    data.push(b);
                }
            }
            ob = offs.next;
        }
        for &b in &data {
            claim(b);
        }
        assert_eq!(data.len() as u64, n.nblocks, "block count out of sync");

        if n.is_dir() {
            assert!(
                n.size <= n.nblocks * FILES_DIR as u64,
                "directory size exceeds its blocks"
            );
            // The first `size` slots are filled; a sentinel follows when
            // the last block is not exactly full.
            let mut entries = 0u64;
            'outer: for &b in &data {
                for e in r.dirents(b) {
                    if entries < n.size {
                        assert_ne!(e.node, NONODE, "hole inside a directory");
                        assert!(
                            validity(r, e.node) == Validity::Linked,
                            "entry references unlinked node"
                        );
                        entries += 1;
                    } else {
                        assert_eq!(e.node, NONODE, "missing end-of-listing sentinel");
                        break 'outer;
                    }
                }
            }
            assert_eq!(entries, n.size, "directory size exceeds stored entries");
            assert!(
                n.nblocks == 0 || n.size > (n.nblocks - 1) * FILES_DIR as u64,
                "directory keeps an empty tail block"
            );
        } else {
            assert!(
                (n.size + BLKSZ as u64 - 1) / BLKSZ as u64 <= n.nblocks,
                "file size exceeds its blocks"
            );
        }
    }

    // The partition: free list and maps together cover the data area.
    for (start, sz) in &free_blocks {
        for b in *start..start + sz {
            assert!(owned.insert(b), "block {} both owned and free", b);
        }
    }
    assert_eq!(
        owned.len() as u64,
        total - ntsize,
        "orphaned blocks in the data area"
    );
}
