//! The set of views for one editor session
//!
//! A [`Session`] owns the overlay store and a list of [`View`]s, and routes
//! every file modification to them. All changes to the view list happen
//! under the session lock; queries against snapshots never take it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use grove_core::diagnostic::{DiagnosticSource, Severity};
use grove_core::layout::{is_module_file, is_workspace_file};
use grove_core::{
    Action, Analyzer, Diagnostic, DocumentUri, FileHandle, FileKind, FileSource, Filterer, Folder, MODULE_FILE, Modification,
    Options, ViewDefinition, WORKSPACE_FILE, bug,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::ignore::IgnoreFilter;
use crate::memoize::Store;
use crate::overlay::{Overlay, OverlayError, OverlayFs};
use crate::select::{best_view_def_for_uri, define_view, folder_for_file, select_view_sources};
use crate::snapshot::{SnapshotRef, StateChange, ViewEnv};
use crate::view::{View, ViewId};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Results shared by every session in the process.
pub struct Cache {
    id: u64,
    store: Arc<Store>,
}

impl Cache {
    pub fn new() -> Arc<Cache> {
        Arc::new(Cache {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            store: Arc::new(Store::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

/// A view whose diagnostics may have changed.
#[derive(Debug)]
pub struct ViewDiagnosis {
    pub view: Arc<View>,
    /// The view's snapshot after the change.
    pub snapshot: SnapshotRef,
    /// Changed files this view is the best match for.
    pub uris: Vec<DocumentUri>,
}

/// The outcome of [`Session::modify_files`].
#[derive(Debug, Default)]
pub struct ModifyResult {
    pub diagnose: Vec<ViewDiagnosis>,
    /// Modifications the overlay store refused; the rest of the batch applied.
    pub rejected: Vec<OverlayError>,
    /// Whether views were added, replaced, or removed.
    pub views_changed: bool,
}

struct SessionState {
    folders: Vec<Arc<Folder>>,
    views: Vec<Arc<View>>,
    /// Memoized best view per file; `None` once the session is shut down.
    view_map: Option<HashMap<DocumentUri, Option<Arc<View>>>>,
}

impl SessionState {
    fn definitions(&self) -> Vec<Arc<ViewDefinition>> {
        self.views.iter().map(|view| view.definition().clone()).collect()
    }

    fn reset_view_map(&mut self) {
        if self.view_map.is_some() {
            self.view_map = Some(HashMap::new());
        }
    }
}

pub struct Session {
    id: u64,
    cache: Arc<Cache>,
    analyzer: Arc<dyn Analyzer>,
    fs: Arc<OverlayFs>,
    default_options: Options,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(cache: Arc<Cache>, analyzer: Arc<dyn Analyzer>, delegate: Arc<dyn FileSource>) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Created session {} on cache {}", id, cache.id());
        Session {
            id,
            cache,
            analyzer,
            fs: Arc::new(OverlayFs::new(delegate)),
            default_options: Options::default(),
            state: Mutex::new(SessionState {
                folders: Vec::new(),
                views: Vec::new(),
                view_map: Some(HashMap::new()),
            }),
        }
    }

    /// Options for views synthesized for files outside every folder.
    pub fn with_default_options(mut self, options: Options) -> Self {
        self.default_options = options;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// The overlay-aware file source shared by every view.
    pub fn fs(&self) -> &Arc<OverlayFs> {
        &self.fs
    }

    pub fn overlays(&self) -> Vec<Arc<Overlay>> {
        self.fs.overlays()
    }

    pub async fn folders(&self) -> Vec<Arc<Folder>> {
        self.state.lock().await.folders.clone()
    }

    pub async fn views(&self) -> Vec<Arc<View>> {
        self.state.lock().await.views.clone()
    }

    pub async fn view(&self, id: ViewId) -> Result<Arc<View>, CacheError> {
        self.state
            .lock()
            .await
            .views
            .iter()
            .find(|view| view.id() == id)
            .cloned()
            .ok_or(CacheError::UnknownView(id))
    }

    /// Create the views for a set of workspace folders, including views for
    /// already-open files that no folder view covers.
    pub async fn initialize(&self, folders: Vec<Folder>) -> Result<Vec<Arc<View>>, CacheError> {
        let folders: Vec<Arc<Folder>> = folders.into_iter().map(Arc::new).collect();
        let mut state = self.state.lock().await;
        if state.view_map.is_none() {
            return Err(CacheError::SessionShutdown);
        }

        let selected = select_view_sources(&*self.fs, &folders, &self.fs.open_uris());
        let mut created = Vec::new();
        for (definition, for_file) in selected {
            if state.views.iter().any(|view| **view.definition() == *definition) {
                continue;
            }
            let (view, _snapshot) = self.create_view(definition, for_file);
            state.views.push(view.clone());
            created.push(view);
        }
        for folder in folders {
            if !state.folders.contains(&folder) {
                state.folders.push(folder);
            }
        }
        state.reset_view_map();
        info!("Session {} initialized with {} views", self.id, state.views.len());
        Ok(created)
    }

    /// Add a view for a new workspace folder.
    pub async fn new_view(&self, folder: Folder) -> Result<(Arc<View>, SnapshotRef), CacheError> {
        let mut state = self.state.lock().await;
        if state.view_map.is_none() {
            return Err(CacheError::SessionShutdown);
        }
        for view in &state.views {
            if same_dir(&view.folder().dir, &folder.dir).await {
                return Err(CacheError::ViewExists(folder.dir));
            }
        }

        let folder = Arc::new(folder);
        let definition = Arc::new(define_view(&*self.fs, &folder, None));
        let (view, snapshot) = self.create_view(definition, None);
        state.views.push(view.clone());
        if !state.folders.contains(&folder) {
            state.folders.push(folder);
        }
        state.reset_view_map();
        Ok((view, snapshot))
    }

    /// Remove the view of the folder at `dir`. Returns whether one existed.
    pub async fn remove_view(&self, dir: &DocumentUri) -> bool {
        let mut state = self.state.lock().await;
        let Some(view) = state.views.iter().find(|view| &view.folder().dir == dir).cloned() else {
            return false;
        };
        state.folders.retain(|folder| &folder.dir != dir);
        self.drop_view_locked(&mut state, &view).is_some()
    }

    /// Recreate the view that owns `uri` from its current definition, discarding
    /// all of its cached state.
    pub async fn reset_view(&self, uri: &DocumentUri) -> Result<Arc<View>, CacheError> {
        let mut state = self.state.lock().await;
        let view = self.view_of_locked(&mut state, uri)?.ok_or(CacheError::NoViews)?;
        let definition = view.definition().clone();
        self.update_view_locked(&mut state, &view, definition)
    }

    /// A snapshot suitable for answering queries about `uri`.
    ///
    /// Prefers the best-matching view. Failing that, waits for each view to
    /// load and picks the first whose build really contains the file, and
    /// finally falls back to the first view.
    pub async fn snapshot_of(&self, uri: &DocumentUri, cancel: &CancellationToken) -> Result<SnapshotRef, CacheError> {
        let best = {
            let mut state = self.state.lock().await;
            self.view_of_locked(&mut state, uri)?
        };
        if let Some(snapshot) = best.and_then(|view| view.snapshot().ok()) {
            return Ok(snapshot);
        }

        let views = self.views().await;
        for view in &views {
            match view.await_initialized(cancel).await {
                Err(CacheError::Cancelled) => return Err(CacheError::Cancelled),
                Err(_) => continue,
                Ok(()) => {}
            }
            let Ok(snapshot) = view.snapshot() else {
                continue;
            };
            if let Err(err) = snapshot.await_loaded(cancel).await {
                if cancel.is_cancelled() {
                    return Err(CacheError::Cancelled);
                }
                debug!("View {} failed to load while looking for {:?}: {}", view.id(), uri, err);
            }
            if snapshot.metadata_if_loaded().is_some_and(|graph| graph.has_real_package(uri)) {
                return Ok(snapshot);
            }
        }

        views
            .iter()
            .find_map(|view| view.snapshot().ok())
            .ok_or(CacheError::NoViews)
    }

    /// Apply a batch of modifications and update every view.
    ///
    /// Rejected modifications are reported and skipped. Changes to workspace
    /// or module files may add, replace, or remove views; snapshots the
    /// caller already holds stay valid regardless.
    pub async fn modify_files(&self, changes: &[Modification]) -> Result<ModifyResult, CacheError> {
        let mut state = self.state.lock().await;
        if state.view_map.is_none() {
            return Err(CacheError::SessionShutdown);
        }

        let mut accepted = Vec::with_capacity(changes.len());
        let mut rejected = Vec::new();
        for change in changes {
            match self.fs.update(change) {
                Ok(()) => accepted.push(change),
                Err(err) => {
                    bug!("rejected {:?} of {:?}: {}", change.action, change.uri, err);
                    rejected.push(err);
                }
            }
        }

        let explicit_workspace_files: HashSet<DocumentUri> = state
            .views
            .iter()
            .filter_map(|view| view.definition().workspace_file.clone())
            .collect();
        let mut check_views = false;
        let mut files = HashMap::new();
        for change in &accepted {
            let uri = &change.uri;
            files.insert(uri.clone(), self.fs.read_file(uri));
            let workspace_file = is_workspace_file(uri) || explicit_workspace_files.contains(uri);
            if workspace_file && (change.action == Action::Save || change.on_disk) {
                check_views = true;
            }
            if is_module_file(uri) && !matches!(change.action, Action::Change | Action::Save) {
                check_views = true;
            }
        }

        // Views created below already observe the new overlays.
        let mut fresh = HashSet::new();
        if check_views {
            for view in state.views.clone() {
                let definition = define_view(&*self.fs, view.folder(), view.for_file());
                if definition == **view.definition() {
                    continue;
                }
                info!("Definition of view {} changed to {}", view.id(), definition);
                let replacement = self.update_view_locked(&mut state, &view, Arc::new(definition))?;
                fresh.insert(replacement.id());
            }
        }

        for change in &accepted {
            if change.action != Action::Open || change.on_disk || FileKind::for_uri(&change.uri) != FileKind::Source {
                continue;
            }
            if let Some(id) = self.synthesize_view_locked(&mut state, &change.uri) {
                fresh.insert(id);
            }
        }
        let views_changed = !fresh.is_empty();
        if views_changed {
            state.reset_view_map();
        }

        let definitions = state.definitions();
        let mut uris_by_view: HashMap<ViewId, Vec<DocumentUri>> = HashMap::new();
        for uri in files.keys() {
            if let Some(index) = best_view_def_for_uri(&*self.fs, uri, &definitions) {
                uris_by_view.entry(state.views[index].id()).or_default().push(uri.clone());
            }
        }

        // Every view is invalidated, not only the best match: packages can be
        // shared between views.
        let change = StateChange { files };
        let open_files: Arc<[DocumentUri]> = self.fs.open_uris().into();
        let mut diagnose = Vec::new();
        for view in &state.views {
            let invalidated = if fresh.contains(&view.id()) {
                view.snapshot().ok().map(|snapshot| (snapshot, true))
            } else {
                view.invalidate(&change, open_files.clone())
            };
            let Some((snapshot, needs_diagnosis)) = invalidated else {
                continue;
            };
            let mut uris = uris_by_view.remove(&view.id()).unwrap_or_default();
            if needs_diagnosis || check_views || !uris.is_empty() {
                uris.sort();
                diagnose.push(ViewDiagnosis {
                    view: view.clone(),
                    snapshot,
                    uris,
                });
            }
        }

        debug!(
            "Applied {} modifications ({} rejected): {} views to diagnose",
            accepted.len(),
            rejected.len(),
            diagnose.len()
        );
        Ok(ModifyResult {
            diagnose,
            rejected,
            views_changed,
        })
    }

    /// Replace a change to a directory by changes to every file beneath it
    /// that some view has observed.
    pub async fn expand_modifications_to_directories(&self, changes: &[Modification]) -> Vec<Modification> {
        let snapshots: Vec<SnapshotRef> = self
            .views()
            .await
            .iter()
            .filter_map(|view| view.snapshot().ok())
            .collect();

        let mut expanded = Vec::with_capacity(changes.len());
        for change in changes {
            let known: BTreeSet<DocumentUri> = snapshots
                .iter()
                .flat_map(|snapshot| snapshot.files_in_dir(&change.uri))
                .collect();
            if known.is_empty() {
                expanded.push(change.clone());
                continue;
            }
            // Directory notifications carry no content or versions.
            expanded.extend(known.into_iter().map(|uri| Modification {
                uri,
                action: change.action,
                on_disk: change.on_disk,
                version: 0,
                text: None,
                language_id: String::new(),
            }));
        }
        expanded
    }

    /// Glob patterns the file watcher should report changes for.
    pub async fn file_watch_glob_patterns(&self) -> BTreeSet<String> {
        let mut patterns = BTreeSet::new();
        patterns.insert(format!("**/{{{},{}}}", MODULE_FILE, WORKSPACE_FILE));
        for view in self.views().await {
            if let Ok(snapshot) = view.snapshot() {
                patterns.extend(snapshot.file_watch_glob_patterns());
            }
        }
        patterns
    }

    /// Diagnostics for open source files that no view really builds.
    pub async fn orphaned_file_diagnostics(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<DocumentUri, Vec<Diagnostic>>, CacheError> {
        let mut diagnostics: BTreeMap<DocumentUri, Vec<Diagnostic>> = BTreeMap::new();
        let mut by_view: BTreeMap<ViewId, (SnapshotRef, Vec<Arc<Overlay>>)> = BTreeMap::new();

        for overlay in self.fs.overlays() {
            if overlay.kind() != FileKind::Source {
                continue;
            }
            let uri = overlay.uri().clone();
            match self.snapshot_of(&uri, cancel).await {
                Ok(snapshot) => by_view
                    .entry(snapshot.view_id())
                    .or_insert_with(|| (snapshot, Vec::new()))
                    .1
                    .push(overlay),
                Err(CacheError::NoViews) => {
                    let message = format!(
                        "No active builds contain {}: consider opening a new workspace folder containing it",
                        uri.path().display()
                    );
                    let diagnostic =
                        Diagnostic::new(uri.clone(), Severity::Warning, message).with_source(DiagnosticSource::Orphaned);
                    diagnostics.entry(uri).or_default().push(diagnostic);
                }
                Err(err) => return Err(err),
            }
        }

        for (snapshot, overlays) in by_view.into_values() {
            for diagnostic in snapshot.orphaned_file_diagnostics(&overlays, cancel).await? {
                diagnostics.entry(diagnostic.uri.clone()).or_default().push(diagnostic);
            }
        }
        Ok(diagnostics)
    }

    /// Shut down every view. Later calls that need the view list fail with
    /// [`CacheError::SessionShutdown`].
    pub async fn shutdown(&self) {
        let views = {
            let mut state = self.state.lock().await;
            state.view_map = None;
            std::mem::take(&mut state.views)
        };
        for view in &views {
            view.shutdown();
        }
        info!("Shut down session {} ({} views)", self.id, views.len());
    }

    fn view_env(&self, definition: &ViewDefinition) -> Arc<ViewEnv> {
        Arc::new(ViewEnv {
            fs: self.fs.clone(),
            analyzer: self.analyzer.clone(),
            store: self.cache.store().clone(),
            ignore: IgnoreFilter::for_definition(definition),
            filterer: Filterer::new(&definition.folder.options.directory_filters),
        })
    }

    fn create_view(&self, definition: Arc<ViewDefinition>, for_file: Option<DocumentUri>) -> (Arc<View>, SnapshotRef) {
        let env = self.view_env(&definition);
        let open_files: Arc<[DocumentUri]> = self.fs.open_uris().into();
        View::create(definition, for_file, env, open_files)
    }

    fn view_of_locked(&self, state: &mut SessionState, uri: &DocumentUri) -> Result<Option<Arc<View>>, CacheError> {
        match &state.view_map {
            None => return Err(CacheError::SessionShutdown),
            Some(map) => {
                if let Some(view) = map.get(uri) {
                    return Ok(view.clone());
                }
            }
        }
        let definitions = state.definitions();
        let view = best_view_def_for_uri(&*self.fs, uri, &definitions).map(|index| state.views[index].clone());
        if let Some(map) = state.view_map.as_mut() {
            map.insert(uri.clone(), view.clone());
        }
        Ok(view)
    }

    /// Replace `view` with a fresh view of `definition` at the same position.
    fn update_view_locked(
        &self,
        state: &mut SessionState,
        view: &Arc<View>,
        definition: Arc<ViewDefinition>,
    ) -> Result<Arc<View>, CacheError> {
        let Some(index) = self.drop_view_locked(state, view) else {
            return Err(CacheError::UnknownView(view.id()));
        };
        let (replacement, snapshot) = self.create_view(definition, view.for_file().cloned());

        // The fresh snapshot has no history; make it see every open file, as
        // the replaced view did through open notifications.
        for uri in self.fs.open_uris() {
            snapshot.read_file(&uri);
        }

        state.views.insert(index, replacement.clone());
        state.reset_view_map();
        Ok(replacement)
    }

    /// Remove and shut down `view`, returning its former position.
    fn drop_view_locked(&self, state: &mut SessionState, view: &Arc<View>) -> Option<usize> {
        state.reset_view_map();
        let Some(index) = state.views.iter().position(|v| Arc::ptr_eq(v, view)) else {
            bug!("view {} not found in session {}", view.id(), self.id);
            return None;
        };
        state.views.remove(index);
        view.shutdown();
        Some(index)
    }

    /// Create a view for a file opened outside every folder and every view.
    fn synthesize_view_locked(&self, state: &mut SessionState, uri: &DocumentUri) -> Option<ViewId> {
        if folder_for_file(&state.folders, uri).is_some() {
            return None;
        }
        let definitions = state.definitions();
        if best_view_def_for_uri(&*self.fs, uri, &definitions).is_some() {
            return None;
        }
        let folder = Arc::new(Folder::new(uri.dir(), self.default_options.clone()));
        let definition = define_view(&*self.fs, &folder, Some(uri));
        if definitions.iter().any(|existing| **existing == definition) {
            warn!("Open file {:?} matches no view, but its definition already exists", uri);
            return None;
        }
        info!("Adding {} for {:?}, which no folder contains", definition, uri);
        let (view, _snapshot) = self.create_view(Arc::new(definition), Some(uri.clone()));
        let id = view.id();
        state.views.push(view);
        Some(id)
    }
}

/// Whether two directory URIs denote the same directory.
///
/// Failures to resolve either path mean "not the same" unless the URIs are equal.
async fn same_dir(a: &DocumentUri, b: &DocumentUri) -> bool {
    if a == b {
        return true;
    }
    match tokio::join!(tokio::fs::canonicalize(a.path()), tokio::fs::canonicalize(b.path())) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
