//! Filesystem-wide constants and the index types used for every
//! cross-reference stored inside the region.
//!
//! The region format is defined in machine words; all indices and sizes are
//! stored as 64-bit words at 8-byte alignment.  Block index 0 always falls
//! inside the header/i-node table and is therefore usable as a null sentinel
//! for block references; i-node indices are signed so that -1 can mark the
//! absence of a node.

/// Block index, counted from the region base.
pub type BlkSet = u64;

/// Byte offset from the region base.
pub type Offset = u64;

/// Size in blocks.
pub type SzBlk = u64;

/// I-node index into the node table.
pub type NodeI = i64;

/// Null sentinel for block indices and byte offsets.
pub const NULLOFF: u64 = 0;

/// Sentinel for invalid or absent i-nodes.
pub const NONODE: NodeI = -1;

/// Size of a block, in bytes.
pub const BLKSZ: usize = 1024;

/// Maximum length of a file name, including the NUL terminator.
pub const NAMELEN: usize = 256 - core::mem::size_of::<NodeI>();

/// Data block references held directly in an i-node.
pub const OFFS_NODE: usize = 5;

/// Data block references held in one indirect-offset block.
pub const OFFS_BLOCK: usize = BLKSZ / core::mem::size_of::<BlkSet>() - 1;

/// Expected data blocks per file; drives the node-table sizing at init.
pub const BLOCKS_FILE: usize = 4;
