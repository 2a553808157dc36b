//! Staged database file comparison and copying.
//!
//! A staged file replaces its live counterpart when their size or
//! modification time differ. The copy carries the staged modification time
//! over, so the next comparison reports the pair as unchanged.

use std::fs::{self, File};
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::error::{GeoError, GeoResult};

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// Length in bytes.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Whether the path is a regular file.
    pub regular: bool,
}

impl FileStamp {
    /// Reads the stamp of `path`.
    pub fn read(path: &Path) -> GeoResult<Self> {
        let meta = fs::metadata(path).map_err(|e| GeoError::io(path, e))?;
        let modified = meta.modified().map_err(|e| GeoError::io(path, e))?;
        Ok(Self {
            len: meta.len(),
            modified,
            regular: meta.is_file(),
        })
    }

    fn differs_from(&self, other: &Self) -> bool {
        self.len != other.len || self.modified != other.modified
    }
}

/// Returns the staged stamp when `staged` differs from `live`.
pub fn staged_update(live: &Path, staged: &Path) -> GeoResult<Option<FileStamp>> {
    let live_stamp = FileStamp::read(live)?;
    let staged_stamp = FileStamp::read(staged)?;

    if staged_stamp.differs_from(&live_stamp) {
        debug!(live = %live.display(), staged = %staged.display(), "Staged file differs");
        Ok(Some(staged_stamp))
    } else {
        Ok(None)
    }
}

/// Copies `src` over `dst` and stamps `dst` with `src`'s modification time.
pub fn copy_preserving_mtime(src: &Path, dst: &Path, src_stamp: &FileStamp) -> GeoResult<()> {
    if !src_stamp.regular {
        return Err(GeoError::NotRegularFile(src.to_path_buf()));
    }

    fs::copy(src, dst).map_err(|e| GeoError::io(src, e))?;

    let copied = File::options()
        .write(true)
        .open(dst)
        .map_err(|e| GeoError::io(dst, e))?;
    copied
        .set_modified(src_stamp.modified)
        .map_err(|e| GeoError::io(dst, e))?;

    Ok(())
}
