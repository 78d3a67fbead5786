//! Typed views over the host-supplied byte region.
//!
//! Everything stored in the region is addressed by block index or byte
//! offset; this module is the only place where those indices become native
//! references.  A reference produced here never outlives the operation that
//! computed it; callers re-derive views after every mutation instead of
//! holding them across calls, which is what makes the no-stored-pointers
//! rule of the on-region format hold.
//!
//! All conversions go through `zerocopy::LayoutVerified`, so a view is only
//! produced for a correctly sized and aligned range.  [`Region::new`]
//! validates the two host-controllable preconditions once (length and base
//! alignment); block and node offsets are multiples of the word size by
//! construction, so the verifier cannot fail afterwards.

use core::mem;

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes, LayoutVerified};

use crate::error::{FsError, Result};
use crate::fs::alloc::FreeReg;
use crate::fs::dir::DirEntry;
use crate::fs::inode::{Inode, OffBlock};
use crate::fs::FsHeader;
use crate::param::{BlkSet, NodeI, SzBlk, BLKSZ, NULLOFF};

const_assert_eq!(BLKSZ % mem::size_of::<Inode>(), 0);
const_assert_eq!(BLKSZ % mem::size_of::<DirEntry>(), 0);
const_assert_eq!(BLKSZ, mem::size_of::<OffBlock>());

fn view<T: FromBytes>(bytes: &[u8]) -> &T {
    LayoutVerified::<&[u8], T>::new(bytes)
        .expect("region view is sized and word-aligned")
        .into_ref()
}

fn view_mut<T: FromBytes + AsBytes>(bytes: &mut [u8]) -> &mut T {
    LayoutVerified::<&mut [u8], T>::new(bytes)
        .expect("region view is sized and word-aligned")
        .into_mut()
}

/// The filesystem's memory region, borrowed from the host for the duration
/// of one operation.
pub struct Region<'r> {
    bytes: &'r mut [u8],
}

impl<'r> Region<'r> {
    /// Wraps the host slice.  Fails if the slice cannot hold the two blocks
    /// a minimal filesystem needs or if its base is not word-aligned (the
    /// on-region structures are arrays of words).
    pub fn new(bytes: &'r mut [u8]) -> Result<Region<'r>> {
        if bytes.len() < 2 * BLKSZ {
            return Err(FsError::BadRegion);
        }
        if bytes.as_ptr() as usize % mem::align_of::<u64>() != 0 {
            return Err(FsError::BadRegion);
        }
        Ok(Region { bytes })
    }

    /// Number of whole blocks the region holds; a trailing partial block is
    /// never used.
    pub fn total_blocks(&self) -> SzBlk {
        (self.bytes.len() / BLKSZ) as SzBlk
    }

    pub fn header(&self) -> &FsHeader {
        view(&self.bytes[..mem::size_of::<FsHeader>()])
    }

    pub fn header_mut(&mut self) -> &mut FsHeader {
        view_mut(&mut self.bytes[..mem::size_of::<FsHeader>()])
    }

    fn node_range(&self, node: NodeI) -> core::ops::Range<usize> {
        assert!(
            node >= 0 && node < self.header().node_count(),
            "i-node index out of range"
        );
        let off = self.header().nodetbl as usize + node as usize * mem::size_of::<Inode>();
        off..off + mem::size_of::<Inode>()
    }

    pub fn node(&self, node: NodeI) -> &Inode {
        view(&self.bytes[self.node_range(node)])
    }

    pub fn node_mut(&mut self, node: NodeI) -> &mut Inode {
        let range = self.node_range(node);
        view_mut(&mut self.bytes[range])
    }

    fn block_range(&self, blk: BlkSet) -> core::ops::Range<usize> {
        assert!(
            blk != NULLOFF && blk < self.total_blocks(),
            "block index out of range"
        );
        let off = blk as usize * BLKSZ;
        off..off + BLKSZ
    }

    pub fn block(&self, blk: BlkSet) -> &[u8] {
        &self.bytes[self.block_range(blk)]
    }

    pub fn block_mut(&mut self, blk: BlkSet) -> &mut [u8] {
        let range = self.block_range(blk);
        &mut self.bytes[range]
    }

    pub fn zero_block(&mut self, blk: BlkSet) {
        for b in self.block_mut(blk) {
            *b = 0;
        }
    }

    /// Zeroes an arbitrary byte range; used when the i-node table is laid
    /// down at initialization.
    pub fn zero_bytes(&mut self, off: usize, len: usize) {
        for b in &mut self.bytes[off..off + len] {
            *b = 0;
        }
    }

    /// Free-region headers are read and written by value: the allocator
    /// rewrites them at shifting block positions as extents shrink and merge.
    pub fn freereg(&self, blk: BlkSet) -> FreeReg {
        *view(&self.block(blk)[..mem::size_of::<FreeReg>()])
    }

    pub fn set_freereg(&mut self, blk: BlkSet, head: FreeReg) {
        *view_mut(&mut self.block_mut(blk)[..mem::size_of::<FreeReg>()]) = head;
    }

    pub fn offblock(&self, blk: BlkSet) -> &OffBlock {
        view(self.block(blk))
    }

    pub fn offblock_mut(&mut self, blk: BlkSet) -> &mut OffBlock {
        view_mut(self.block_mut(blk))
    }

    pub fn dirents(&self, blk: BlkSet) -> &[DirEntry] {
        LayoutVerified::<&[u8], [DirEntry]>::new_slice(self.block(blk))
            .expect("directory block is sized and word-aligned")
            .into_slice()
    }

    pub fn dirents_mut(&mut self, blk: BlkSet) -> &mut [DirEntry] {
        LayoutVerified::<&mut [u8], [DirEntry]>::new_slice(self.block_mut(blk))
            .expect("directory block is sized and word-aligned")
            .into_mut_slice()
    }
}
