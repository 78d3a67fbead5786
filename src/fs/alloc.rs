//! Block allocator.
//!
//! Free space is a list of maximal extents ("free regions"), each described
//! by a two-word header written at its first block.  The list is kept
//! sorted by block index, strictly ascending, with no two regions adjacent:
//! freeing merges neighbors, so region count only grows at true gaps.
//!
//! Allocation peels blocks off the front of the list, rewriting each
//! region's header at its new first block (or unlinking the region once it
//! empties).  Every block handed out is zero-filled here: the growth paths
//! of files and directories rely on fresh indirect-offset blocks and data
//! blocks reading as all-NULLOFF / all-zero.
//!
//! Freeing takes an arbitrary batch, heap-sorts it in place and then merges
//! it into the list in one forward pass, which keeps a batch of n blocks at
//! O(n log n + n + F) for a list of F regions.  Entries that do not name a
//! freeable block (the NULLOFF sentinel, table blocks, anything past the
//! region, blocks already free) are dropped silently, which is what lets
//! callers free whole reference arrays without filtering them first.

use zerocopy::{AsBytes, FromBytes};

use crate::param::{BlkSet, SzBlk, NULLOFF};
use crate::region::Region;

/// Header of a free region, stored at the region's first block.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, AsBytes)]
pub struct FreeReg {
    /// Extent length in blocks; never zero.
    pub size: SzBlk,

    /// Next free region, or NULLOFF.
    pub next: BlkSet,
}

/// Allocates up to `buf.len()` blocks, writing their indices into `buf`
/// front to back.  Returns the number actually allocated, which falls short
/// only when the filesystem runs out of blocks; each allocated block is
/// zero-filled.
pub fn blk_alloc(r: &mut Region<'_>, buf: &mut [BlkSet]) -> usize {
    let mut free_off = r.header().freelist;
    let mut prev = NULLOFF;
    let mut alloct = 0;

    while alloct < buf.len() && free_off != NULLOFF {
        let head = r.freereg(free_off);
        let mut taken: SzBlk = 0;
        while taken < head.size && alloct < buf.len() {
            buf[alloct] = free_off + taken;
            alloct += 1;
            taken += 1;
        }
        for i in 0..taken {
            r.zero_block(free_off + i);
        }
        if taken == head.size {
            // Extent exhausted: unlink it.
            if prev == NULLOFF {
                r.header_mut().freelist = head.next;
            } else {
                let mut p = r.freereg(prev);
                p.next = head.next;
                r.set_freereg(prev, p);
            }
            free_off = head.next;
        } else {
            // Advance the extent past the taken prefix.
            let moved = free_off + taken;
            r.set_freereg(
                moved,
                FreeReg {
                    size: head.size - taken,
                    next: head.next,
                },
            );
            if prev == NULLOFF {
                r.header_mut().freelist = moved;
            } else {
                let mut p = r.freereg(prev);
                p.next = moved;
                r.set_freereg(prev, p);
            }
            prev = moved;
            free_off = moved;
        }
    }
    r.header_mut().free -= alloct as u64;
    alloct
}

/// Returns a batch of blocks to the free list, overwriting every entry of
/// `buf` with NULLOFF.  Returns the number of blocks actually freed;
/// entries outside the data area and blocks that are already free are
/// dropped without effect.
pub fn blk_free(r: &mut Region<'_>, buf: &mut [BlkSet]) -> usize {
    heapsort(buf);
    let ntsize = r.header().ntsize;
    let total = r.header().size;
    let mut freed = 0;
    let mut cur = NULLOFF;

    for slot in buf.iter_mut() {
        let b = core::mem::replace(slot, NULLOFF);
        if b < ntsize || b >= total {
            continue;
        }
        let head = r.header().freelist;
        if head == NULLOFF || b < head {
            r.set_freereg(b, FreeReg { size: 1, next: head });
            r.header_mut().freelist = b;
            absorb_next(r, b);
            cur = b;
            freed += 1;
            continue;
        }
        if cur == NULLOFF {
            cur = head;
        }
        loop {
            let fr = r.freereg(cur);
            if b < cur + fr.size {
                // Inside an existing region: duplicate free, drop it.
                break;
            }
            if fr.next != NULLOFF && b >= fr.next {
                cur = fr.next;
                continue;
            }
            if b == cur + fr.size {
                // Touches the predecessor: extend it forward.
                r.set_freereg(
                    cur,
                    FreeReg {
                        size: fr.size + 1,
                        next: fr.next,
                    },
                );
            } else {
                // Splice a fresh single-block region after the predecessor.
                r.set_freereg(b, FreeReg { size: 1, next: fr.next });
                r.set_freereg(
                    cur,
                    FreeReg {
                        size: fr.size,
                        next: b,
                    },
                );
                cur = b;
            }
            absorb_next(r, cur);
            freed += 1;
            break;
        }
    }
    r.header_mut().free += freed as u64;
    freed
}

/// Merges the region at `at` with its successor when the two touch.
fn absorb_next(r: &mut Region<'_>, at: BlkSet) {
    let fr = r.freereg(at);
    if fr.next != NULLOFF && at + fr.size == fr.next {
        let succ = r.freereg(fr.next);
        r.set_freereg(
            at,
            FreeReg {
                size: fr.size + succ.size,
                next: succ.next,
            },
        );
    }
}

/// In-place heap sort, ascending.  Chosen over library sorts to keep the
/// free path allocation-free.
fn heapsort(data: &mut [BlkSet]) {
    let len = data.len();
    for i in (0..len / 2).rev() {
        sift_down(data, i, len);
    }
    for end in (1..len).rev() {
        data.swap(0, end);
        sift_down(data, 0, end);
    }
}

fn sift_down(heap: &mut [BlkSet], mut at: usize, len: usize) {
    loop {
        let left = 2 * at + 1;
        let right = left + 1;
        let mut big = at;
        if left < len && heap[left] > heap[big] {
            big = left;
        }
        if right < len && heap[right] > heap[big] {
            big = right;
        }
        if big == at {
            return;
        }
        heap.swap(at, big);
        at = big;
    }
}
