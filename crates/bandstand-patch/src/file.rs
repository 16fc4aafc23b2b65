//! Virtual files: the filesystem abstraction behind a patch, plus the
//! native `std::fs` implementation.

use crate::error::{PatchError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// A file or directory in whatever store holds the patch sources.
pub trait VirtualFile: Send + Sync {
    /// Leaf name, including any extension.
    fn name(&self) -> String;

    /// Display path, unique within the store.
    fn full_path(&self) -> String;

    fn parent(&self) -> Option<Arc<dyn VirtualFile>>;

    /// Resolves a relative path against this directory.
    fn child(&self, relative: &str) -> Option<Arc<dyn VirtualFile>>;

    /// Modification time in milliseconds since the epoch, when known.
    fn last_modified(&self) -> Option<i64>;

    fn read_to_string(&self) -> Result<String>;
}

/// A [`VirtualFile`] backed by the local filesystem.
pub struct NativeFile {
    path: PathBuf,
}

impl NativeFile {
    pub fn new(path: impl Into<PathBuf>) -> Arc<dyn VirtualFile> {
        Arc::new(Self { path: path.into() })
    }
}

impl VirtualFile for NativeFile {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn full_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn parent(&self) -> Option<Arc<dyn VirtualFile>> {
        self.path.parent().map(|p| NativeFile::new(p.to_path_buf()))
    }

    fn child(&self, relative: &str) -> Option<Arc<dyn VirtualFile>> {
        if Path::new(relative).is_absolute() {
            return Some(NativeFile::new(relative));
        }
        Some(NativeFile::new(self.path.join(relative)))
    }

    fn last_modified(&self) -> Option<i64> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(since_epoch.as_millis() as i64)
    }

    fn read_to_string(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|source| PatchError::Io {
            path: self.full_path(),
            source,
        })
    }
}
