//! File sources: where file content comes from

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use ignore::WalkBuilder;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::file::{BrokenFile, DiskFile, FileError, FileHandle};
use crate::uri::DocumentUri;

/// Anything that can produce file handles.
pub trait FileSource: Send + Sync {
    /// Read the current state of a file. Never fails: errors are carried by the handle.
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle>;

    /// Every file beneath `dir`, in path order.
    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri>;

    /// Whether a file exists and is readable.
    fn exists(&self, uri: &DocumentUri) -> bool {
        self.read_file(uri).exists()
    }
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl DiskFs {
    pub fn new() -> Self {
        DiskFs
    }
}

impl FileSource for DiskFs {
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        match std::fs::read(uri.path()) {
            Ok(bytes) => Arc::new(DiskFile::new(uri.clone(), Ok(Arc::from(bytes)))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Arc::new(DiskFile::new(uri.clone(), Err(FileError::from_io(uri, &err))))
            }
            Err(err) => {
                warn!("Unexpected failure reading {:?}: {}", uri, err);
                Arc::new(BrokenFile {
                    uri: uri.clone(),
                    err: FileError::from_io(uri, &err),
                })
            }
        }
    }

    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        let walker = WalkBuilder::new(dir.path())
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .build();
        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                    files.push(DocumentUri::from_path(entry.path()));
                }
                Ok(_) => {}
                Err(err) => debug!("Skipping unreadable entry under {:?}: {}", dir, err),
            }
        }
        files.sort();
        files
    }
}

/// An in-memory file tree, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemFs {
    files: RwLock<BTreeMap<DocumentUri, Arc<[u8]>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, content)` pairs.
    pub fn with_files<P: AsRef<std::path::Path>>(files: &[(P, &str)]) -> Self {
        let fs = MemFs::new();
        for (path, content) in files {
            fs.write(DocumentUri::from_path(path), content.as_bytes());
        }
        fs
    }

    pub fn write(&self, uri: DocumentUri, content: impl Into<Arc<[u8]>>) {
        self.files.write().insert(uri, content.into());
    }

    pub fn remove(&self, uri: &DocumentUri) -> bool {
        self.files.write().remove(uri).is_some()
    }
}

impl FileSource for MemFs {
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        let content = match self.files.read().get(uri) {
            Some(bytes) => Ok(bytes.clone()),
            None => {
                let err = io::Error::new(io::ErrorKind::NotFound, "no such file");
                Err(FileError::from_io(uri, &err))
            }
        };
        Arc::new(DiskFile::new(uri.clone(), content))
    }

    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        self.files
            .read()
            .keys()
            .filter(|uri| dir.encloses(uri))
            .cloned()
            .collect()
    }
}

impl<T: FileSource + ?Sized> FileSource for Arc<T> {
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        (**self).read_file(uri)
    }

    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        (**self).files_under(dir)
    }
}
