//! Unsaved editor buffers layered over a file source

use std::collections::HashMap;
use std::sync::Arc;

use grove_core::{
    Action, ContentHash, DocumentUri, FileError, FileHandle, FileIdentity, FileKind, FileSource, Modification,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum OverlayError {
    #[error("modifying unopened overlay {0:?}")]
    Unopened(DocumentUri),
    /// The editor saved content different from what it last sent us.
    #[error("file {uri:?} changed on save: had {expected:?}, saved {actual:?}")]
    ChangedOnSave {
        uri: DocumentUri,
        expected: ContentHash,
        actual: ContentHash,
    },
    #[error("no content for {0:?}")]
    NoContent(DocumentUri),
}

/// The editor's in-memory version of one open file.
#[derive(Debug)]
pub struct Overlay {
    uri: DocumentUri,
    version: i32,
    content: Arc<[u8]>,
    kind: FileKind,
    hash: ContentHash,
    saved: bool,
}

impl Overlay {
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Whether the buffer matches the file on disk.
    pub fn saved(&self) -> bool {
        self.saved
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}

impl FileHandle for Overlay {
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
        self.version
    }

    fn content(&self) -> Result<Arc<[u8]>, FileError> {
        Ok(self.content.clone())
    }

    fn same_content_on_disk(&self) -> bool {
        self.saved
    }

    fn is_overlay(&self) -> bool {
        true
    }
}

/// A file source that prefers open editor buffers to its delegate.
///
/// Overlays are replaced wholesale on every change: a published overlay is
/// never mutated, so snapshots may hold onto them freely.
pub struct OverlayFs {
    delegate: Arc<dyn FileSource>,
    overlays: Mutex<HashMap<DocumentUri, Arc<Overlay>>>,
}

impl OverlayFs {
    pub fn new(delegate: Arc<dyn FileSource>) -> Self {
        OverlayFs {
            delegate,
            overlays: Mutex::new(HashMap::new()),
        }
    }

    pub fn delegate(&self) -> &Arc<dyn FileSource> {
        &self.delegate
    }

    /// Every open overlay, in path order.
    pub fn overlays(&self) -> Vec<Arc<Overlay>> {
        let mut overlays: Vec<_> = self.overlays.lock().values().cloned().collect();
        overlays.sort_by(|a, b| a.uri.cmp(&b.uri));
        overlays
    }

    pub fn overlay(&self, uri: &DocumentUri) -> Option<Arc<Overlay>> {
        self.overlays.lock().get(uri).cloned()
    }

    /// URIs of every open overlay, in path order.
    pub fn open_uris(&self) -> Vec<DocumentUri> {
        self.overlays().iter().map(|o| o.uri.clone()).collect()
    }

    /// Apply one modification.
    ///
    /// A rejected modification leaves the overlay untouched.
    pub fn update(&self, change: &Modification) -> Result<(), OverlayError> {
        let mut overlays = self.overlays.lock();
        self.apply(&mut overlays, change)
    }

    fn apply(
        &self,
        overlays: &mut HashMap<DocumentUri, Arc<Overlay>>,
        change: &Modification,
    ) -> Result<(), OverlayError> {
        let uri = &change.uri;
        let existing = overlays.get(uri).cloned();

        // Disk notifications only concern files the editor has open.
        if existing.is_none() && change.on_disk {
            return Ok(());
        }

        let kind = match (change.action, &existing) {
            (Action::Open, _) => match FileKind::for_language_id(&change.language_id) {
                FileKind::Unknown => FileKind::for_uri(uri),
                kind => kind,
            },
            (_, Some(existing)) => existing.kind,
            (_, None) => return Err(OverlayError::Unopened(uri.clone())),
        };

        if change.action == Action::Close {
            overlays.remove(uri);
            debug!("Closed overlay {:?}", uri);
            return Ok(());
        }

        let keeps_previous = change.action == Action::Save || change.on_disk;
        let content = match (&change.text, &existing) {
            (Some(text), _) => text.clone(),
            (None, Some(existing)) if keeps_previous => existing.content.clone(),
            _ => return Err(OverlayError::NoContent(uri.clone())),
        };
        let hash = ContentHash::of(&content);

        let version = match &existing {
            Some(existing) if keeps_previous => existing.version,
            _ => change.version,
        };

        let saved = match change.action {
            Action::Delete => false,
            Action::Save => {
                if let (Some(_), Some(existing)) = (&change.text, &existing) {
                    if existing.hash != hash {
                        return Err(OverlayError::ChangedOnSave {
                            uri: uri.clone(),
                            expected: existing.hash,
                            actual: hash,
                        });
                    }
                }
                true
            }
            _ => {
                let on_disk = self.delegate.read_file(uri);
                on_disk.exists() && on_disk.identity().hash == hash
            }
        };

        overlays.insert(
            uri.clone(),
            Arc::new(Overlay {
                uri: uri.clone(),
                version,
                content,
                kind,
                hash,
                saved,
            }),
        );
        Ok(())
    }
}

impl FileSource for OverlayFs {
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        if let Some(overlay) = self.overlay(uri) {
            return overlay;
        }
        self.delegate.read_file(uri)
    }

    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        let mut files = self.delegate.files_under(dir);
        files.extend(self.overlays.lock().keys().filter(|uri| dir.encloses(uri)).cloned());
        files.sort();
        files.dedup();
        files
    }
}
