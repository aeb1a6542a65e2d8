use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::errors::IndexError;

/// A whole file mapped read-only.
///
/// The mapping is shared freely between the searcher's worker threads; it
/// outlives every slice handed out by the typed readers because those readers
/// own it.
pub struct MmapFile {
    path: PathBuf,
    map: Mmap,
}

impl MmapFile {
    pub fn open(path: &Path) -> Result<MmapFile, IndexError> {
        let file = File::open(path).map_err(|source| IndexError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let map = unsafe { Mmap::map(&file) }.map_err(|source| IndexError::Open {
            path: path.display().to_string(),
            source,
        })?;
        if map.is_empty() {
            return Err(IndexError::Truncated { path: path.display().to_string() });
        }
        Ok(MmapFile { path: path.to_path_buf(), map })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.map
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hints the kernel that accesses will be random. Best effort.
    pub fn advise_random(&self) {
        #[cfg(unix)]
        let _ = self.map.advise(memmap2::Advice::Random);
    }
}
