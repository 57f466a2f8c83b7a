//! Filesystem watcher implementation

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use grove_cache::{ModifyResult, Session};
use grove_core::{Action, DocumentUri, Modification};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::filter::{WatchFilter, should_ignore_path};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File or directory created
    Created(PathBuf),
    /// File or directory modified
    Modified(PathBuf),
    /// File or directory removed
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => path,
        }
    }

    /// The on-disk modification this event reports.
    pub fn to_modification(&self) -> Modification {
        let action = match self {
            WatchEvent::Created(_) => Action::Create,
            WatchEvent::Modified(_) => Action::Change,
            WatchEvent::Removed(_) => Action::Delete,
        };
        Modification::on_disk(DocumentUri::from_path(self.path()), action)
    }
}

/// File system watcher for monitoring workspace folders
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    watched_paths: HashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                Self::handle_notify_event(event, &event_tx);
            }
            Err(e) => error!("File system watch error: {}", e),
        })?;

        Ok(Self {
            watcher,
            event_rx,
            watched_paths: HashSet::new(),
        })
    }

    /// Handle a notify event and convert to our watch events
    fn handle_notify_event(event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let make: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) => WatchEvent::Created,
            notify::EventKind::Modify(_) => WatchEvent::Modified,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if should_ignore_path(&path) {
                continue;
            }
            if let Err(e) = event_tx.send(make(path)) {
                warn!("Failed to send watch event: {}", e);
            }
        }
    }

    /// Watch a directory recursively
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.watched_paths.contains(path) {
            return Ok(());
        }
        info!("Watching directory: {:?}", path);
        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Stopping watch for: {:?}", path);
        self.watcher.unwatch(path)?;
        self.watched_paths.remove(path);
        Ok(())
    }

    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.watched_paths
    }
}

/// Forwards batches of disk changes to a [`Session`].
pub struct WatcherService {
    watcher: Mutex<FileWatcher>,
    session: Arc<Session>,
    filter: Mutex<WatchFilter>,
    debounce: Duration,
}

impl WatcherService {
    pub fn new(session: Arc<Session>) -> Result<Self> {
        Ok(Self {
            watcher: Mutex::new(FileWatcher::new()?),
            session,
            filter: Mutex::new(WatchFilter::new(&Default::default())),
            debounce: Duration::from_millis(50),
        })
    }

    /// How long to wait for more events before applying a batch.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Watch every workspace folder of the session and load its watch patterns.
    pub async fn start_watching(&self) -> Result<()> {
        let folders = self.session.folders().await;
        let mut watcher = self.watcher.lock().await;
        for folder in &folders {
            watcher.watch_directory(folder.dir.path())?;
        }
        drop(watcher);
        self.refresh_filter().await;
        info!("Started watching {} folders", folders.len());
        Ok(())
    }

    /// Rebuild the path filter from the session's current views.
    pub async fn refresh_filter(&self) {
        let patterns = self.session.file_watch_glob_patterns().await;
        let mut filter = self.filter.lock().await;
        if filter.patterns() != &patterns {
            debug!("Watch patterns: {:?}", patterns);
            *filter = WatchFilter::new(&patterns);
        }
    }

    /// Apply one batch of events to the session.
    ///
    /// Returns `None` when no event in the batch concerns the session.
    pub async fn apply(&self, events: &[WatchEvent]) -> Result<Option<ModifyResult>> {
        let filter = self.filter.lock().await.clone();
        let mut changes: Vec<Modification> = Vec::with_capacity(events.len());
        for event in events {
            if !filter.admits(event.path()) {
                continue;
            }
            let change = event.to_modification();
            if changes.last().is_some_and(|last| last.uri == change.uri && last.action == change.action) {
                continue;
            }
            changes.push(change);
        }

        let mut changes = self.session.expand_modifications_to_directories(&changes).await;
        changes.retain(|change| filter.matches(change.uri.path()));
        if changes.is_empty() {
            return Ok(None);
        }

        debug!("Applying {} disk changes", changes.len());
        let result = self.session.modify_files(&changes).await?;
        if result.views_changed {
            self.refresh_filter().await;
        }
        Ok(Some(result))
    }

    /// Process file system events until the channel closes or `cancel` fires.
    pub async fn process_events(&self, cancel: &CancellationToken) -> Result<()> {
        let mut watcher = self.watcher.lock().await;
        let event_rx = watcher.event_receiver();

        loop {
            let first = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => return Ok(()),
                },
            };
            let mut batch = vec![first];
            while let Ok(Some(event)) = tokio::time::timeout(self.debounce, event_rx.recv()).await {
                batch.push(event);
            }

            match self.apply(&batch).await {
                Ok(Some(result)) => info!(
                    "Applied {} watch events: {} views to diagnose",
                    batch.len(),
                    result.diagnose.len()
                ),
                Ok(None) => debug!("Ignored {} watch events", batch.len()),
                Err(e) => error!("Failed to apply watch events: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use grove_analyzer::DirectoryAnalyzer;
    use grove_cache::Cache;
    use grove_core::{DiskFs, Folder, Options};
    use tempfile::TempDir;

    use super::*;

    fn disk_session() -> Arc<Session> {
        Arc::new(Session::new(Cache::new(), Arc::new(DirectoryAnalyzer::new()), Arc::new(DiskFs::new())))
    }

    #[test]
    fn test_events_become_disk_modifications() {
        let change = WatchEvent::Removed(PathBuf::from("/w/a.gv")).to_modification();
        assert_eq!(change.action, Action::Delete);
        assert!(change.on_disk);
        assert_eq!(change.uri, DocumentUri::from_path("/w/a.gv"));
    }

    #[tokio::test]
    async fn test_file_watcher_creation() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch_directory(temp_dir.path()).unwrap();
        assert!(watcher.is_watching(temp_dir.path()));
        watcher.unwatch(temp_dir.path()).unwrap();
        assert!(watcher.watched_paths().is_empty());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch_directory(temp_dir.path()).unwrap();

        let test_file = temp_dir.path().join("test.gv");
        std::fs::write(&test_file, "package test").unwrap();

        // Backends differ in what they report; any event for the file will do.
        let received = tokio::time::timeout(Duration::from_secs(2), watcher.event_receiver().recv()).await;
        if let Ok(Some(event)) = received {
            assert!(event.path().ends_with("test.gv"));
        }
    }

    #[tokio::test]
    async fn test_apply_forwards_matching_changes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("grove.mod"), "module = \"w\"").unwrap();
        std::fs::write(root.join("a.gv"), "package w\n").unwrap();

        let session = disk_session();
        session
            .initialize(vec![Folder::new(DocumentUri::from_path(root), Options::default())])
            .await
            .unwrap();
        let service = WatcherService::new(session.clone()).unwrap();
        service.start_watching().await.unwrap();

        let ignored = service
            .apply(&[WatchEvent::Modified(root.join("notes.txt"))])
            .await
            .unwrap();
        assert!(ignored.is_none());

        std::fs::write(root.join("a.gv"), "package w\nfn A() {}\n").unwrap();
        let result = service
            .apply(&[
                WatchEvent::Modified(root.join("a.gv")),
                WatchEvent::Modified(root.join("a.gv")),
            ])
            .await
            .unwrap()
            .unwrap();
        assert!(!result.views_changed);
        assert!(result.rejected.is_empty());
        assert_eq!(result.diagnose.len(), 1);
    }
}
