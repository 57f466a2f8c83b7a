//! File handles, kinds, and modifications

use std::fmt;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::layout::{MODULE_FILE, SOURCE_EXTENSION, WORKSPACE_FILE};
use crate::uri::DocumentUri;

/// SHA-256 of a file's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(content: &[u8]) -> Self {
        ContentHash(Sha256::digest(content).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Broad classification of a file, which decides how it participates in a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Program source, grouped into packages by the analyzer.
    Source,
    /// A module definition file (`grove.mod`).
    Module,
    /// A workspace definition file (`grove.work`).
    Workspace,
    Unknown,
}

impl FileKind {
    /// Determine the kind from an editor-declared language identifier.
    pub fn for_language_id(language_id: &str) -> Self {
        match language_id {
            "grove" => FileKind::Source,
            "grove.mod" => FileKind::Module,
            "grove.work" => FileKind::Workspace,
            _ => FileKind::Unknown,
        }
    }

    /// Determine the kind from the file name alone.
    pub fn for_uri(uri: &DocumentUri) -> Self {
        match uri.base_name() {
            Some(MODULE_FILE) => FileKind::Module,
            Some(WORKSPACE_FILE) => FileKind::Workspace,
            _ if uri.extension() == Some(SOURCE_EXTENSION) => FileKind::Source,
            _ => FileKind::Unknown,
        }
    }
}

/// The content identity of a file at some point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub uri: DocumentUri,
    pub hash: ContentHash,
}

/// Failure to obtain a file's content.
#[derive(Debug, Clone, Error)]
#[error("reading {uri:?}: {message}")]
pub struct FileError {
    pub uri: DocumentUri,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl FileError {
    pub fn from_io(uri: &DocumentUri, err: &io::Error) -> Self {
        FileError {
            uri: uri.clone(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == io::ErrorKind::NotFound
    }
}

/// A read-only view of a file's content at a point in time.
///
/// Read errors are part of the handle: obtaining a handle never fails.
pub trait FileHandle: Send + Sync + fmt::Debug {
    fn uri(&self) -> &DocumentUri;

    fn identity(&self) -> FileIdentity;

    /// Editor version for overlays; zero for files read from disk.
    fn version(&self) -> i32;

    fn content(&self) -> Result<Arc<[u8]>, FileError>;

    /// Whether the content matches what is stored on disk.
    fn same_content_on_disk(&self) -> bool;

    /// Whether this handle is backed by an in-memory overlay.
    fn is_overlay(&self) -> bool {
        false
    }

    fn exists(&self) -> bool {
        self.content().is_ok()
    }
}

/// A file as read from a backing store.
#[derive(Debug, Clone)]
pub struct DiskFile {
    uri: DocumentUri,
    hash: ContentHash,
    content: Result<Arc<[u8]>, FileError>,
}

impl DiskFile {
    pub fn new(uri: DocumentUri, content: Result<Arc<[u8]>, FileError>) -> Self {
        let hash = match &content {
            Ok(bytes) => ContentHash::of(bytes),
            Err(_) => ContentHash::of(b""),
        };
        DiskFile { uri, hash, content }
    }
}

impl FileHandle for DiskFile {
    fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    fn identity(&self) -> FileIdentity {
        FileIdentity {
            uri: self.uri.clone(),
            hash: self.hash,
        }
    }

    fn version(&self) -> i32 {
        0
    }

    fn content(&self) -> Result<Arc<[u8]>, FileError> {
        self.content.clone()
    }

    fn same_content_on_disk(&self) -> bool {
        true
    }
}

/// An unexpected failure to read a file.
#[derive(Debug, Clone)]
pub struct BrokenFile {
    pub uri: DocumentUri,
    pub err: FileError,
}

impl FileHandle for BrokenFile {
    fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    fn identity(&self) -> FileIdentity {
        FileIdentity {
            uri: self.uri.clone(),
            hash: ContentHash::of(b""),
        }
    }

    fn version(&self) -> i32 {
        0
    }

    fn content(&self) -> Result<Arc<[u8]>, FileError> {
        Err(self.err.clone())
    }

    fn same_content_on_disk(&self) -> bool {
        false
    }
}

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Open,
    Change,
    Close,
    Save,
    Create,
    Delete,
}

/// A single file modification reported by the editor or the file watcher.
#[derive(Debug, Clone)]
pub struct Modification {
    pub uri: DocumentUri,
    pub action: Action,
    /// Set for notifications that originate from the filesystem rather than the editor.
    pub on_disk: bool,
    pub version: i32,
    /// New content, when the notification carries one.
    pub text: Option<Arc<[u8]>>,
    /// Language identifier declared on open.
    pub language_id: String,
}

impl Modification {
    pub fn open(uri: DocumentUri, version: i32, text: impl Into<Arc<[u8]>>, language_id: &str) -> Self {
        Modification {
            uri,
            action: Action::Open,
            on_disk: false,
            version,
            text: Some(text.into()),
            language_id: language_id.to_string(),
        }
    }

    pub fn change(uri: DocumentUri, version: i32, text: impl Into<Arc<[u8]>>) -> Self {
        Modification {
            uri,
            action: Action::Change,
            on_disk: false,
            version,
            text: Some(text.into()),
            language_id: String::new(),
        }
    }

    /// A save notification. `text` is the content the editor believes it saved, if sent.
    pub fn save(uri: DocumentUri, text: Option<Arc<[u8]>>) -> Self {
        Modification {
            uri,
            action: Action::Save,
            on_disk: false,
            version: 0,
            text,
            language_id: String::new(),
        }
    }

    pub fn close(uri: DocumentUri) -> Self {
        Modification {
            uri,
            action: Action::Close,
            on_disk: false,
            version: 0,
            text: None,
            language_id: String::new(),
        }
    }

    /// A filesystem notification; these never carry content or versions.
    pub fn on_disk(uri: DocumentUri, action: Action) -> Self {
        Modification {
            uri,
            action,
            on_disk: true,
            version: 0,
            text: None,
            language_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_uri() {
        assert_eq!(FileKind::for_uri(&DocumentUri::from_path("/a/grove.mod")), FileKind::Module);
        assert_eq!(FileKind::for_uri(&DocumentUri::from_path("/a/grove.work")), FileKind::Workspace);
        assert_eq!(FileKind::for_uri(&DocumentUri::from_path("/a/x.gv")), FileKind::Source);
        assert_eq!(FileKind::for_uri(&DocumentUri::from_path("/a/README")), FileKind::Unknown);
    }

    #[test]
    fn test_hash_is_content_addressed() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
    }

    #[test]
    fn test_missing_disk_file_does_not_exist() {
        let uri = DocumentUri::from_path("/missing.gv");
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let file = DiskFile::new(uri.clone(), Err(FileError::from_io(&uri, &err)));
        assert!(!file.exists());
        assert!(file.content().unwrap_err().is_not_found());
    }
}
