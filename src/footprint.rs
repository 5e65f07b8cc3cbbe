//! Footprint Reporter
//!
//! On-disk size of a data directory.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Recursive sum of file sizes under `path`, in bytes
///
/// Symlinks are not followed. Any unreadable entry aborts the walk.
pub fn dir_size(path: &Path) -> Result<f64> {
    Ok(walk(path)? as f64)
}

fn walk(path: &Path) -> Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += walk(&entry?.path())?;
    }
    Ok(total)
}
