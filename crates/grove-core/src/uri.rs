//! Document identifiers

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies a file or directory known to the workspace.
///
/// URIs are always absolute, lexically normalized paths. Two URIs are equal
/// when their normalized paths are equal; no filesystem access is involved.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentUri(Arc<Path>);

impl DocumentUri {
    /// Build a URI from a path, normalizing `.` and `..` components.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        DocumentUri(normalize(path.as_ref()).into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// The directory containing this file.
    ///
    /// The root directory is its own parent.
    pub fn dir(&self) -> DocumentUri {
        match self.0.parent() {
            Some(parent) => DocumentUri(parent.into()),
            None => self.clone(),
        }
    }

    /// Join a relative path onto this directory URI.
    pub fn join(&self, rel: impl AsRef<Path>) -> DocumentUri {
        DocumentUri::from_path(self.0.join(rel))
    }

    /// Reports whether `other` is this directory or lies beneath it.
    pub fn encloses(&self, other: &DocumentUri) -> bool {
        other.0.starts_with(&self.0)
    }

    /// The final path component, if any.
    pub fn base_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }

    /// The file extension, without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        self.0.extension().and_then(|e| e.to_str())
    }

    /// Length of the path in bytes, used to rank enclosing roots.
    pub fn depth_key(&self) -> usize {
        self.0.as_os_str().len()
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file://{}", self.0.display())
    }
}

impl fmt::Debug for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for DocumentUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.path().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DocumentUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PathBuf::deserialize(deserializer).map(DocumentUri::from_path)
    }
}

impl From<&Path> for DocumentUri {
    fn from(path: &Path) -> Self {
        DocumentUri::from_path(path)
    }
}

impl From<PathBuf> for DocumentUri {
    fn from(path: PathBuf) -> Self {
        DocumentUri::from_path(path)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
