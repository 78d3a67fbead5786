//! Operations surface.
//!
//! Thirteen calls compose the primitives of `fs::*` into the usual
//! filesystem verbs.  Every call takes the region slice, revalidates it and
//! runs the idempotent initializer before touching anything, so the first
//! operation after a fresh mapping formats the region and every later one
//! finds it as left.  The host serializes calls; nothing here suspends or
//! retries.
//!
//! Mutating calls keep a fixed ordering discipline: lookups and other
//! fallible steps come first, region mutation last, so a failed call leaves
//! the region unchanged.  The one composite mutation, rename across two
//! parent directories, arms an undo for its first half.

use log::{debug, trace};
use scopeguard::{guard, ScopeGuard};

use crate::error::{FsError, Result};
use crate::fs;
use crate::fs::cursor::FPos;
use crate::fs::dir::{self, DIRENT_SIZE};
use crate::fs::inode::{new_node, FileMode, TimeSpec};
use crate::fs::path::{self, Path};
use crate::fs::resize::frealloc;
use crate::fs::stat::{Attr, StatVfs};
use crate::param::{BLKSZ, NAMELEN, NONODE, NULLOFF};
use crate::region::Region;

/// Opens the region for one operation: validates the slice and initializes
/// the filesystem if this mapping has not been used before.
fn setup<'r>(region: &'r mut [u8]) -> Result<Region<'r>> {
    let mut r = Region::new(region)?;
    fs::init(&mut r)?;
    Ok(r)
}

/// Reports the attributes of the file or directory at `path`; `uid` and
/// `gid` are echoed into the result.
pub fn getattr(region: &mut [u8], path: &Path, uid: u32, gid: u32) -> Result<Attr> {
    let r = setup(region)?;
    trace!("getattr {}", path.display());
    let node = path::resolve(&r, path)?;
    let n = r.node(node);
    let size = if n.is_dir() {
        n.size * DIRENT_SIZE as u64
    } else {
        n.size
    };
    Ok(Attr {
        uid,
        gid,
        mode: FileMode::from_bits_truncate(n.mode),
        nlink: n.nlinks,
        size,
        atime: n.atime,
        mtime: n.mtime,
        ctime: n.ctime,
    })
}

/// Lists the names in the directory at `path`, in storage order.
pub fn readdir(region: &mut [u8], path: &Path) -> Result<Vec<Vec<u8>>> {
    let r = setup(region)?;
    trace!("readdir {}", path.display());
    let node = path::resolve(&r, path)?;
    if !r.node(node).is_dir() {
        return Err(FsError::NotDir);
    }
    let mut names = Vec::with_capacity(r.node(node).size as usize);
    let mut pos = FPos::load(&r, node);
    while pos.data != NULLOFF {
        let e = &r.dirents(pos.dblk)[pos.dpos];
        if e.node == NONODE {
            break;
        }
        names.push(e.name().to_vec());
        pos.seek(&r, 1);
    }
    Ok(names)
}

fn create(region: &mut [u8], path: &Path, mode: FileMode) -> Result<()> {
    let mut r = setup(region)?;
    let (parent, name) = path::resolve_parent(&r, path)?;
    let node = new_node(&mut r).ok_or(FsError::NoSpace)?;
    let now = TimeSpec::now().ok_or(FsError::Access)?;
    {
        let n = r.node_mut(node);
        n.mode = mode.bits();
        n.atime = now;
        n.mtime = now;
        n.ctime = now;
    }
    dir::insert(&mut r, parent, name, node)?;
    r.node_mut(parent).mtime = now;
    Ok(())
}

/// Creates an empty regular file at `path`.
pub fn mknod(region: &mut [u8], path: &Path) -> Result<()> {
    trace!("mknod {}", path.display());
    create(region, path, FileMode::FILEMODE)
}

/// Creates an empty directory at `path`.
pub fn mkdir(region: &mut [u8], path: &Path) -> Result<()> {
    trace!("mkdir {}", path.display());
    create(region, path, FileMode::DIRMODE)
}

/// Removes the directory entry at `path`; once the last link is gone the
/// node's data blocks return to the free list.
pub fn unlink(region: &mut [u8], path: &Path) -> Result<()> {
    let mut r = setup(region)?;
    trace!("unlink {}", path.display());
    let (parent, name) = path::resolve_parent(&r, path)?;
    let now = TimeSpec::now().ok_or(FsError::Access)?;
    let node = dir::remove(&mut r, parent, name)?;
    r.node_mut(parent).mtime = now;
    if r.node(node).nlinks == 0 && r.node(node).is_file() {
        frealloc(&mut r, node, 0)?;
    }
    Ok(())
}

/// Removes the empty directory at `path`.
pub fn rmdir(region: &mut [u8], path: &Path) -> Result<()> {
    let mut r = setup(region)?;
    trace!("rmdir {}", path.display());
    let (parent, name) = path::resolve_parent(&r, path)?;
    let node = dir::lookup(&r, parent, name)?;
    if !r.node(node).is_dir() {
        return Err(FsError::NotDir);
    }
    let now = TimeSpec::now().ok_or(FsError::Access)?;
    dir::remove(&mut r, parent, name)?;
    r.node_mut(parent).mtime = now;
    Ok(())
}

/// Moves the entry at `from` to `to`.  Within one directory this is an
/// in-place rename; across directories the entry is inserted at `to` first
/// and the insertion is undone if removing `from` then fails.
pub fn rename(region: &mut [u8], from: &Path, to: &Path) -> Result<()> {
    let mut r = setup(region)?;
    trace!("rename {} -> {}", from.display(), to.display());
    let (pfrom, ffrom) = path::resolve_parent(&r, from)?;
    let (pto, fto) = path::resolve_parent(&r, to)?;
    let node = dir::lookup(&r, pfrom, ffrom)?;
    let now = TimeSpec::now().ok_or(FsError::Access)?;

    if pfrom == pto {
        dir::rename(&mut r, pfrom, ffrom, fto)?;
        r.node_mut(pfrom).mtime = now;
        return Ok(());
    }

    // The target name must be free; an occupied non-empty directory is the
    // one case with its own error.
    match dir::lookup(&r, pto, fto) {
        Ok(existing) => {
            let e = r.node(existing);
            return Err(if e.is_dir() && e.size > 0 {
                FsError::NotEmpty
            } else {
                FsError::Exists
            });
        }
        Err(FsError::NotFound) => {}
        Err(e) => return Err(e),
    }

    dir::insert(&mut r, pto, fto, node)?;
    let mut undo = guard(r, |mut r| {
        debug!("rename: removing {} again after failed unlink", to.display());
        let _ = dir::remove(&mut r, pto, fto);
    });
    if dir::remove(&mut *undo, pfrom, ffrom).is_err() {
        return Err(FsError::Access);
    }
    let mut r = ScopeGuard::into_inner(undo);
    r.node_mut(pfrom).mtime = now;
    r.node_mut(pto).mtime = now;
    Ok(())
}

/// Sets the regular file at `path` to exactly `size` bytes, zero-filling
/// any growth.
pub fn truncate(region: &mut [u8], path: &Path, size: u64) -> Result<()> {
    let mut r = setup(region)?;
    trace!("truncate {} to {}", path.display(), size);
    let node = path::resolve(&r, path)?;
    frealloc(&mut r, node, size).map_err(|e| {
        debug!("truncate {}: {}", path.display(), e);
        FsError::NotPermitted
    })
}

/// Checks that `path` resolves; the host tracks any handle state itself.
pub fn open(region: &mut [u8], path: &Path) -> Result<()> {
    let r = setup(region)?;
    trace!("open {}", path.display());
    path::resolve(&r, path)?;
    Ok(())
}

/// Reads up to `buf.len()` bytes from the file at `path` starting at byte
/// `off`; returns the count actually read, 0 at or past end of file.
pub fn read(region: &mut [u8], path: &Path, buf: &mut [u8], off: u64) -> Result<usize> {
    let r = setup(region)?;
    trace!("read {} {}B @{}", path.display(), buf.len(), off);
    let node = path::resolve(&r, path)?;
    if r.node(node).is_dir() {
        return Err(FsError::IsDir);
    }
    let size = r.node(node).size;
    let mut pos = FPos::load(&r, node);
    pos.seek(&r, off);

    let mut done = 0;
    while pos.data != NULLOFF && done < buf.len() {
        let within = pos.dpos;
        let at = pos.nblk * BLKSZ as u64 + within as u64;
        let step = (buf.len() - done)
            .min(BLKSZ - within)
            .min((size - at) as usize);
        buf[done..done + step].copy_from_slice(&r.block(pos.dblk)[within..within + step]);
        done += step;
        pos.seek(&r, step as u64);
    }
    Ok(done)
}

/// Writes `buf` into the file at `path` starting at byte `off`, growing the
/// file as needed (a gap between the old end and `off` reads as zeros).
/// When the region fills mid-way the count written so far is returned;
/// failing to write even one byte reports `NoSpace`.
pub fn write(region: &mut [u8], path: &Path, buf: &[u8], off: u64) -> Result<usize> {
    let mut r = setup(region)?;
    trace!("write {} {}B @{}", path.display(), buf.len(), off);
    let node = path::resolve(&r, path)?;
    if r.node(node).is_dir() {
        return Err(FsError::IsDir);
    }
    if buf.is_empty() {
        return Ok(0);
    }
    let now = TimeSpec::now().ok_or(FsError::Access)?;

    if off >= r.node(node).size {
        // Materialize the write position: out to the end of its block or
        // to the end of the write, whichever is nearer.
        let to_boundary = (off + BLKSZ as u64 - 1) / BLKSZ as u64 * BLKSZ as u64;
        frealloc(&mut r, node, to_boundary.min(off + buf.len() as u64))?;
    }
    let mut pos = FPos::load(&r, node);
    pos.seek(&r, off);

    let mut done = 0;
    while done < buf.len() {
        if pos.data == NULLOFF {
            // Grow one block at a time: each step is cheap and a full
            // region still keeps everything written so far.
            let goal = (off + buf.len() as u64).min((r.node(node).nblocks + 1) * BLKSZ as u64);
            if frealloc(&mut r, node, goal).is_err() {
                debug!("write {}: region full after {}B", path.display(), done);
                break;
            }
            pos = FPos::load(&r, node);
            pos.seek(&r, off + done as u64);
            continue;
        }
        let within = pos.dpos;
        let at = pos.nblk * BLKSZ as u64 + within as u64;
        let size = r.node(node).size;
        let step = (buf.len() - done)
            .min(BLKSZ - within)
            .min((size - at) as usize);
        r.block_mut(pos.dblk)[within..within + step].copy_from_slice(&buf[done..done + step]);
        done += step;
        pos.seek(&r, step as u64);
    }
    if done == 0 {
        return Err(FsError::NoSpace);
    }
    r.node_mut(node).mtime = now;
    Ok(done)
}

/// Sets the access and modification times of the file at `path`.
pub fn utimens(region: &mut [u8], path: &Path, atime: TimeSpec, mtime: TimeSpec) -> Result<()> {
    let mut r = setup(region)?;
    trace!("utimens {}", path.display());
    let node = path::resolve(&r, path)?;
    let n = r.node_mut(node);
    n.atime = atime;
    n.mtime = mtime;
    Ok(())
}

/// Reports block usage and the name-length limit.
pub fn statfs(region: &mut [u8]) -> Result<StatVfs> {
    let r = setup(region)?;
    let h = r.header();
    Ok(StatVfs {
        bsize: BLKSZ as u64,
        blocks: h.size,
        bfree: h.free,
        bavail: h.free,
        namemax: NAMELEN as u64 - 1,
    })
}
