//! One build configuration and its current snapshot

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use grove_core::{DocumentUri, Folder, ViewDefinition};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::snapshot::{Snapshot, SnapshotRef, StateChange, ViewEnv};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(u64);

impl ViewId {
    pub(crate) fn next() -> Self {
        ViewId(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ViewId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ViewId)
    }
}

/// Lifecycle of a view. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ViewState {
    /// The initial workspace load is running.
    Initializing,
    Ready,
    ShuttingDown,
    Shutdown,
}

pub struct View {
    id: ViewId,
    definition: Arc<ViewDefinition>,
    /// The open file this view was created for, when it is not a folder's own view.
    for_file: Option<DocumentUri>,
    current: Mutex<Option<SnapshotRef>>,
    state: Mutex<ViewState>,
    background: CancellationToken,
    initialized: watch::Sender<bool>,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("definition", &format_args!("{}", self.definition))
            .field("state", &self.state())
            .finish()
    }
}

impl View {
    /// Create a view and its first snapshot, and start the initial workspace load.
    ///
    /// The snapshot starts with three references: the view's "current"
    /// reference, one held by the background load until it finishes, and the
    /// one returned to the caller.
    pub(crate) fn create(
        definition: Arc<ViewDefinition>,
        for_file: Option<DocumentUri>,
        env: Arc<ViewEnv>,
        open_files: Arc<[DocumentUri]>,
    ) -> (Arc<View>, SnapshotRef) {
        let id = ViewId::next();
        let background = CancellationToken::new();
        let snapshot = Snapshot::initial(id, definition.clone(), env, background.child_token(), open_files);
        let (initialized, _) = watch::channel(false);

        let view = Arc::new(View {
            id,
            definition,
            for_file,
            current: Mutex::new(Some(snapshot.acquire())),
            state: Mutex::new(ViewState::Initializing),
            background: background.clone(),
            initialized,
        });
        info!("Created view {}: {}", id, view.definition);

        let loading = snapshot.acquire();
        let weak = Arc::downgrade(&view);
        let cancel = background.child_token();
        tokio::spawn(async move {
            loading.initialize(&cancel).await;
            drop(loading);
            if let Some(view) = weak.upgrade() {
                view.mark_initialized();
            }
        });

        (view, snapshot)
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn definition(&self) -> &Arc<ViewDefinition> {
        &self.definition
    }

    pub fn folder(&self) -> &Arc<Folder> {
        &self.definition.folder
    }

    pub(crate) fn for_file(&self) -> Option<&DocumentUri> {
        self.for_file.as_ref()
    }

    pub fn state(&self) -> ViewState {
        *self.state.lock()
    }

    /// A reference to the current snapshot.
    pub fn snapshot(&self) -> Result<SnapshotRef, CacheError> {
        match self.current.lock().as_ref() {
            Some(snapshot) => Ok(snapshot.acquire()),
            None => Err(CacheError::ViewShutdown(self.id)),
        }
    }

    /// Wait until the initial workspace load has completed or been abandoned.
    pub async fn await_initialized(&self, cancel: &CancellationToken) -> Result<(), CacheError> {
        let mut ready = self.initialized.subscribe();
        tokio::select! {
            _ = cancel.cancelled() => Err(CacheError::Cancelled),
            result = ready.wait_for(|initialized| *initialized) => {
                result.map(|_| ()).map_err(|_| CacheError::ViewShutdown(self.id))
            }
        }
    }

    fn mark_initialized(&self) {
        {
            let mut state = self.state.lock();
            if *state == ViewState::Initializing {
                *state = ViewState::Ready;
            }
        }
        self.initialized.send_replace(true);
        debug!("View {} initialized", self.id);
    }

    /// Apply a change, installing a forked snapshot as current when the
    /// change is relevant to this view.
    ///
    /// Returns the (possibly unchanged) current snapshot and whether the
    /// change affects this view's diagnostics, or `None` after shutdown.
    pub fn invalidate(&self, change: &StateChange, open_files: Arc<[DocumentUri]>) -> Option<(SnapshotRef, bool)> {
        let mut current = self.current.lock();
        let old = current.as_ref()?;
        if !old.is_relevant(change) {
            return Some((old.acquire(), false));
        }

        old.background_token().cancel();
        let (next, needs_diagnosis) = old.fork(change, open_files, self.background.child_token());
        let previous = current.replace(next.acquire());
        drop(current);
        drop(previous);
        Some((next, needs_diagnosis))
    }

    /// Stop all background work and release the current snapshot.
    ///
    /// Snapshots still referenced by callers stay readable until released.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state >= ViewState::ShuttingDown {
                return;
            }
            *state = ViewState::ShuttingDown;
        }
        self.background.cancel();
        let released = self.current.lock().take();
        drop(released);
        *self.state.lock() = ViewState::Shutdown;
        self.initialized.send_replace(true);
        info!("Shut down view {}", self.id);
    }
}
