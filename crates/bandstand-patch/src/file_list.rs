//! The refreshable tree of files behind one patch.

use crate::error::{PatchError, Result};
use crate::file::VirtualFile;
use crate::manifest::{parse_manifest, Description, Manifest, MANIFEST_SUFFIX};
use std::sync::Arc;

#[derive(Clone)]
struct TrackedFile {
    file: Arc<dyn VirtualFile>,
    last_modified: Option<i64>,
}

/// The manifest, its directory, and the source files it names. `refresh`
/// re-reads everything from the store; stale state survives a failed
/// refresh so the previous description can still be inspected.
#[derive(Clone, Default)]
pub struct FileList {
    manifest_file: Option<Arc<dyn VirtualFile>>,
    root: Option<Arc<dyn VirtualFile>>,
    manifest_name: String,
    manifest: Option<Manifest>,
    files: Vec<TrackedFile>,
}

impl FileList {
    pub fn new(manifest_file: Arc<dyn VirtualFile>) -> Self {
        let manifest_name = manifest_file.name();
        let is_manifest = manifest_name.ends_with(MANIFEST_SUFFIX);
        Self {
            root: is_manifest.then(|| manifest_file.parent()).flatten(),
            manifest_file: is_manifest.then(|| manifest_file.clone()),
            manifest_name,
            manifest: None,
            files: Vec::new(),
        }
    }

    pub fn manifest_path(&self) -> String {
        self.manifest_file
            .as_ref()
            .map(|file| file.full_path())
            .unwrap_or_else(|| self.manifest_name.clone())
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Re-reads the manifest and re-resolves every source file it names.
    pub fn refresh(&mut self) -> Result<()> {
        let manifest_file = self.manifest_file.clone().ok_or_else(|| {
            PatchError::LoadFailed(format!(
                "{} is not a patch manifest (expected the {MANIFEST_SUFFIX} suffix)",
                self.manifest_name
            ))
        })?;
        let root = self
            .root
            .clone()
            .ok_or_else(|| PatchError::LoadFailed("manifest has no parent directory".into()))?;

        let manifest = parse_manifest(&manifest_file.read_to_string()?)?;

        let mut files = vec![TrackedFile {
            last_modified: manifest_file.last_modified(),
            file: manifest_file,
        }];
        for source in manifest.source.iter() {
            let file = root
                .child(source)
                .ok_or_else(|| PatchError::MissingFile(source.to_owned()))?;
            if file.last_modified().is_none() {
                return Err(PatchError::MissingFile(source.to_owned()));
            }
            files.push(TrackedFile {
                last_modified: file.last_modified(),
                file,
            });
        }

        self.manifest = Some(manifest);
        self.files = files;
        Ok(())
    }

    /// Description of the last successfully refreshed manifest, or an error
    /// stub when none has ever been read.
    pub fn create_description(&self) -> Description {
        match &self.manifest {
            Some(manifest) => Description::from_manifest(manifest, &self.manifest_path()),
            None => Description::from_error(&self.manifest_path(), "Manifest has not been loaded"),
        }
    }

    /// The source files named by the manifest, excluding the manifest
    /// itself.
    pub fn source_files(&self) -> impl Iterator<Item = &Arc<dyn VirtualFile>> {
        self.files.iter().skip(1).map(|tracked| &tracked.file)
    }

    /// Max modification time across the tree, re-read from the store.
    pub fn most_recent_modification_time(&self) -> Option<i64> {
        self.files
            .iter()
            .filter_map(|tracked| tracked.file.last_modified().or(tracked.last_modified))
            .max()
    }

    /// True when any file's modification time moved since the last refresh.
    pub fn has_changed(&self) -> bool {
        self.files
            .iter()
            .any(|tracked| tracked.file.last_modified() != tracked.last_modified)
    }
}
