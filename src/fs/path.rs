//! Path resolution.
//!
//! Paths are byte strings beginning with `/`, resolved component by
//! component from the root directory.  A trailing slash after the final
//! component is tolerated; an empty interior component (`a//b`) does not
//! resolve.  Name components longer than the directory format can store
//! are truncated, not rejected, to match what the directory engine does on
//! insertion.

use crate::error::{FsError, Result};
use crate::fs::dir;
use crate::param::NodeI;
use crate::region::Region;

/// A slash-separated path borrowed from the host.
#[repr(transparent)]
pub struct Path {
    inner: [u8],
}

impl Path {
    pub fn new(bytes: &[u8]) -> &Path {
        // SAFETY: `&Path` is layout-compatible with `&[u8]` because of its
        // attribute `#[repr(transparent)]`.
        unsafe { &*(bytes as *const [u8] as *const Path) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn is_absolute(&self) -> bool {
        self.inner.first() == Some(&b'/')
    }

    /// Lossy display form for diagnostics.
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.inner).into_owned()
    }
}

/// Resolves `path` to its node.
pub fn resolve(r: &Region<'_>, path: &Path) -> Result<NodeI> {
    Ok(walk(r, path, false)?.0)
}

/// Resolves the parent directory of `path`, returning its node and the
/// trailing name component (which borrows from `path`).  Fails on `/`,
/// which has no parent component to return.
pub fn resolve_parent<'p>(r: &Region<'_>, path: &'p Path) -> Result<(NodeI, &'p [u8])> {
    let (node, child) = walk(r, path, true)?;
    let child = child.ok_or(FsError::NotFound)?;
    Ok((node, child))
}

fn walk<'p>(r: &Region<'_>, path: &'p Path, parent: bool) -> Result<(NodeI, Option<&'p [u8]>)> {
    let bytes = path.as_bytes();
    if !path.is_absolute() {
        return Err(FsError::NotFound);
    }
    let mut node: NodeI = 0;
    let mut at = 1;
    while at < bytes.len() {
        // The component runs to just past the next slash, or to the end.
        let start = at;
        let mut end = at;
        while end < bytes.len() {
            let c = bytes[end];
            end += 1;
            if c == b'/' {
                break;
            }
        }
        if parent && end == bytes.len() {
            // Stop one level early; the caller owns the final component.
            return Ok((node, Some(&bytes[start..])));
        }
        node = dir::lookup(r, node, &bytes[start..])?;
        at = end;
    }
    if parent {
        return Err(FsError::NotFound);
    }
    Ok((node, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use crate::fs::inode::{new_node, FileMode};
    use crate::testutil;

    fn setup() -> Vec<u64> {
        let mut buf = testutil::region_words(16);
        let mut r = Region::new(testutil::region_bytes(&mut buf)).unwrap();
        fs::init(&mut r).unwrap();

        // /a/b plus a file /a/f
        let a = new_node(&mut r).unwrap();
        r.node_mut(a).mode = FileMode::DIRMODE.bits();
        dir::insert(&mut r, 0, b"a", a).unwrap();
        let b = new_node(&mut r).unwrap();
        r.node_mut(b).mode = FileMode::DIRMODE.bits();
        dir::insert(&mut r, a, b"b", b).unwrap();
        let f = new_node(&mut r).unwrap();
        r.node_mut(f).mode = FileMode::FILEMODE.bits();
        dir::insert(&mut r, a, b"f", f).unwrap();
        buf
    }

    #[test]
    fn resolves_root_and_nested_components() {
        let mut buf = setup();
        let r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        assert_eq!(resolve(&r, Path::new(b"/")), Ok(0));
        assert_eq!(resolve(&r, Path::new(b"/a")), Ok(1));
        assert_eq!(resolve(&r, Path::new(b"/a/b")), Ok(2));
        assert_eq!(resolve(&r, Path::new(b"/a/b/")), Ok(2));
        assert_eq!(resolve(&r, Path::new(b"/a/f")), Ok(3));
        assert_eq!(resolve(&r, Path::new(b"/missing")), Err(FsError::NotFound));
        assert_eq!(resolve(&r, Path::new(b"/a/missing")), Err(FsError::NotFound));
    }

    #[test]
    fn rejects_degenerate_paths() {
        let mut buf = setup();
        let r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        assert_eq!(resolve(&r, Path::new(b"")), Err(FsError::NotFound));
        assert_eq!(resolve(&r, Path::new(b"a/b")), Err(FsError::NotFound));
        assert_eq!(resolve(&r, Path::new(b"/a//b")), Err(FsError::NotFound));
        // A file in the middle of a path is not a directory.
        assert_eq!(resolve(&r, Path::new(b"/a/f/x")), Err(FsError::NotDir));
    }

    #[test]
    fn parent_resolution_stops_one_level_early() {
        let mut buf = setup();
        let r = Region::new(testutil::region_bytes(&mut buf)).unwrap();

        let (node, child) = resolve_parent(&r, Path::new(b"/a/b")).unwrap();
        assert_eq!(node, 1);
        assert_eq!(child, b"b");

        // The final component need not exist yet.
        let (node, child) = resolve_parent(&r, Path::new(b"/a/new")).unwrap();
        assert_eq!(node, 1);
        assert_eq!(child, b"new");

        let (node, child) = resolve_parent(&r, Path::new(b"/a/b/")).unwrap();
        assert_eq!(node, 1);
        assert_eq!(child, b"b/");

        assert_eq!(resolve_parent(&r, Path::new(b"/")), Err(FsError::NotFound));
    }
}
