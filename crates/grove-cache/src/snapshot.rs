//! Immutable, versioned states of one view
//!
//! A [`Snapshot`] is the unit of consistency: every query answered by one
//! snapshot sees the same file contents and the same package graph. Snapshots
//! are never modified after publication except to memoize results that are
//! pure functions of their inputs. Changes produce a new snapshot via
//! [`Snapshot::fork`], which carries forward every memoized handle the change
//! cannot affect.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use grove_core::diagnostic::{DiagnosticSource, Severity};
use grove_core::layout::{parse_module_file, parse_workspace_file};
use grove_core::{
    Analyzer, Diagnostic, DocumentUri, FileHandle, FileKind, FileSource, Filterer, MetadataGraph, PackageId,
    PackageInputs, PackageMetadata, ParsedFile, SOURCE_EXTENSION, TypeInfo, ViewDefinition, ViewKind, bug,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::ignore::IgnoreFilter;
use crate::memoize::{Promise, Store, StoreKey};
use crate::overlay::{Overlay, OverlayFs};
use crate::persistent::Map;
use crate::select::missing_member;
use crate::view::ViewId;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// The files touched by one batch of modifications, with their new handles.
#[derive(Debug, Clone, Default)]
pub struct StateChange {
    pub files: HashMap<DocumentUri, Arc<dyn FileHandle>>,
}

/// A parsed workspace or module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub uri: DocumentUri,
    pub kind: FileKind,
    pub module_path: Option<String>,
    /// Module files aggregated by a workspace file.
    pub modules: Vec<DocumentUri>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConfigFile {
    fn parse(file: &dyn FileHandle) -> ConfigFile {
        let uri = file.uri().clone();
        let kind = FileKind::for_uri(&uri);
        let mut config = ConfigFile {
            uri: uri.clone(),
            kind,
            module_path: None,
            modules: Vec::new(),
            diagnostics: Vec::new(),
        };
        let content = match file.content() {
            Ok(content) => content,
            Err(err) if err.is_not_found() => return config,
            Err(err) => {
                config
                    .diagnostics
                    .push(Diagnostic::new(uri, Severity::Error, format!("cannot read: {}", err.message)));
                return config;
            }
        };
        match kind {
            FileKind::Workspace => {
                let manifest = parse_workspace_file(&uri, &content);
                config.modules = manifest.modules;
                config.diagnostics = manifest.diagnostics;
            }
            FileKind::Module => {
                let manifest = parse_module_file(&uri, &content);
                config.module_path = manifest.module_path;
                config.diagnostics = manifest.diagnostics;
            }
            FileKind::Source | FileKind::Unknown => {}
        }
        config
    }
}

/// State shared by every snapshot of one view.
pub(crate) struct ViewEnv {
    pub(crate) fs: Arc<OverlayFs>,
    pub(crate) analyzer: Arc<dyn Analyzer>,
    pub(crate) store: Arc<Store>,
    pub(crate) ignore: IgnoreFilter,
    pub(crate) filterer: Filterer,
}

/// A type-check handle and the inputs it was built from.
#[derive(Clone)]
struct PackageEntry {
    metadata: Arc<PackageMetadata>,
    deps: Vec<Promise<TypeInfo>>,
    handle: Promise<TypeInfo>,
}

impl PackageEntry {
    fn is_current(&self, metadata: &PackageMetadata, deps: &[Promise<TypeInfo>]) -> bool {
        *self.metadata == *metadata
            && self.deps.len() == deps.len()
            && self.deps.iter().zip(deps).all(|(a, b)| Promise::ptr_eq(a, b))
    }
}

#[derive(Clone, Default)]
struct SnapshotMaps {
    files: Map<DocumentUri, Arc<dyn FileHandle>>,
    parse_handles: Map<DocumentUri, Promise<ParsedFile>>,
    packages: Map<PackageId, PackageEntry>,
    config_handles: Map<DocumentUri, Promise<ConfigFile>>,
}

/// Files a metadata load read from the live source, as it saw them.
type ReadLog = Arc<Mutex<HashMap<DocumentUri, Arc<dyn FileHandle>>>>;

/// The files a metadata computation sees: the snapshot's files as of the
/// fork, falling back to the live file source for everything else.
struct FrozenSource {
    files: Map<DocumentUri, Arc<dyn FileHandle>>,
    live: Arc<OverlayFs>,
    reads: ReadLog,
}

impl FileSource for FrozenSource {
    fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        if let Some(file) = self.files.get(uri) {
            return file.clone();
        }
        self.reads
            .lock()
            .entry(uri.clone())
            .or_insert_with(|| self.live.read_file(uri))
            .clone()
    }

    fn files_under(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        let mut files = self.live.files_under(dir);
        files.extend(self.files.keys().filter(|uri| dir.encloses(uri)).cloned());
        files.sort();
        files.dedup();
        files.retain(|uri| self.files.get(uri).is_none_or(|file| file.exists()));
        files
    }
}

pub struct Snapshot {
    sequence_id: u64,
    view_id: ViewId,
    definition: Arc<ViewDefinition>,
    env: Arc<ViewEnv>,
    /// Cancelled when the snapshot is superseded or destroyed.
    background: CancellationToken,
    refcount: AtomicUsize,
    destroyed: AtomicBool,
    maps: Mutex<SnapshotMaps>,
    metadata: Promise<MetadataGraph>,
    /// What the metadata load read, shared by every snapshot using the same load.
    metadata_reads: ReadLog,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("view", &self.view_id)
            .field("sequence", &self.sequence_id)
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl Snapshot {
    /// The first snapshot of a view. The returned reference is the only one.
    pub(crate) fn initial(
        view_id: ViewId,
        definition: Arc<ViewDefinition>,
        env: Arc<ViewEnv>,
        background: CancellationToken,
        open_files: Arc<[DocumentUri]>,
    ) -> SnapshotRef {
        let maps = SnapshotMaps::default();
        let reads = ReadLog::default();
        let metadata = metadata_promise(&env, &definition, maps.files.clone(), open_files, reads.clone());
        Snapshot::publish(view_id, definition, env, background, maps, (metadata, reads))
    }

    fn publish(
        view_id: ViewId,
        definition: Arc<ViewDefinition>,
        env: Arc<ViewEnv>,
        background: CancellationToken,
        maps: SnapshotMaps,
        (metadata, metadata_reads): (Promise<MetadataGraph>, ReadLog),
    ) -> SnapshotRef {
        SnapshotRef {
            snapshot: Arc::new(Snapshot {
                sequence_id: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
                view_id,
                definition,
                env,
                background,
                refcount: AtomicUsize::new(1),
                destroyed: AtomicBool::new(false),
                maps: Mutex::new(maps),
                metadata,
                metadata_reads,
            }),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    pub fn definition(&self) -> &Arc<ViewDefinition> {
        &self.definition
    }

    /// Token for work done on this snapshot's behalf, cancelled on teardown.
    pub fn background_token(&self) -> CancellationToken {
        self.background.clone()
    }

    /// Number of outstanding [`SnapshotRef`]s.
    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// The snapshot's version of `uri`.
    ///
    /// The first read of a file is recorded, so later reads through this
    /// snapshot return the same handle even if the file changes meanwhile.
    pub fn read_file(&self, uri: &DocumentUri) -> Arc<dyn FileHandle> {
        if let Some(file) = self.maps.lock().files.get(uri) {
            return file.clone();
        }
        let file = self.env.fs.read_file(uri);
        let mut maps = self.maps.lock();
        if let Some(raced) = maps.files.get(uri) {
            return raced.clone();
        }
        maps.files.set(uri.clone(), file.clone());
        file
    }

    /// The handle for `uri` if this snapshot has already observed it.
    pub fn find_file(&self, uri: &DocumentUri) -> Option<Arc<dyn FileHandle>> {
        self.maps.lock().files.get(uri).cloned()
    }

    /// Observed files beneath `dir`, excluding `dir` itself.
    pub fn files_in_dir(&self, dir: &DocumentUri) -> Vec<DocumentUri> {
        let mut files: Vec<_> = self
            .maps
            .lock()
            .files
            .keys()
            .filter(|uri| *uri != dir && dir.encloses(uri))
            .cloned()
            .collect();
        files.sort();
        files
    }

    pub fn is_ignored(&self, uri: &DocumentUri) -> bool {
        self.env.ignore.ignored(uri)
    }

    /// Whether the folder's directory filters exclude `uri`.
    pub fn is_filtered(&self, uri: &DocumentUri) -> bool {
        let folder = &self.definition.folder.dir;
        match uri.dir().path().strip_prefix(folder.path()) {
            Ok(rel) => self.env.filterer.disallow(rel),
            Err(_) => false,
        }
    }

    /// Directories this view builds.
    pub fn roots(&self) -> Vec<DocumentUri> {
        let modules = self.definition.module_dirs();
        if modules.is_empty() {
            vec![self.definition.root.clone()]
        } else {
            modules
        }
    }

    pub async fn metadata_graph(&self, cancel: &CancellationToken) -> Result<Arc<MetadataGraph>, CacheError> {
        self.metadata.get(cancel).await
    }

    /// The package graph, if some caller has already loaded it.
    pub fn metadata_if_loaded(&self) -> Option<Arc<MetadataGraph>> {
        self.metadata.cached()
    }

    /// Wait until the package graph is loaded.
    pub async fn await_loaded(&self, cancel: &CancellationToken) -> Result<(), CacheError> {
        self.metadata_graph(cancel).await.map(|_| ())
    }

    /// The memoized parse of `uri`, shared with every snapshot and session
    /// that sees identical content.
    pub fn parse_handle(&self, uri: &DocumentUri) -> Promise<ParsedFile> {
        if let Some(handle) = self.maps.lock().parse_handles.get(uri) {
            return handle.clone();
        }
        let file = self.read_file(uri);
        // Read failures are not content-addressable.
        let key = file.exists().then(|| StoreKey::new("parse", uri, file.identity().hash));
        let analyzer = self.env.analyzer.clone();
        let label = format!("parse {:?}", uri);
        let make = move || {
            Promise::new(label, move |cancel| {
                let analyzer = analyzer.clone();
                let file = file.clone();
                async move { analyzer.parse_file(file.as_ref(), &cancel).await.map_err(CacheError::from) }
            })
        };
        let handle = match key {
            Some(key) => self.env.store.promise(key, make),
            None => make(),
        };

        let mut maps = self.maps.lock();
        if let Some(raced) = maps.parse_handles.get(uri) {
            return raced.clone();
        }
        maps.parse_handles.set(uri.clone(), handle.clone());
        handle
    }

    pub async fn parsed_file(&self, uri: &DocumentUri, cancel: &CancellationToken) -> Result<Arc<ParsedFile>, CacheError> {
        self.parse_handle(uri).get(cancel).await
    }

    /// The memoized type-check handle of package `id`.
    ///
    /// A handle carried over from an earlier snapshot is reused only while
    /// its metadata and dependency handles still match the current graph.
    pub async fn package_handle(&self, id: &PackageId, cancel: &CancellationToken) -> Result<Promise<TypeInfo>, CacheError> {
        let graph = self.metadata_graph(cancel).await?;
        self.build_package_handle(&graph, id, &mut HashSet::new())
    }

    /// The handle recorded for `id`, without checking it against the graph.
    pub fn cached_package_handle(&self, id: &PackageId) -> Option<Promise<TypeInfo>> {
        self.maps.lock().packages.get(id).map(|entry| entry.handle.clone())
    }

    pub async fn package(&self, id: &PackageId, cancel: &CancellationToken) -> Result<Arc<TypeInfo>, CacheError> {
        self.package_handle(id, cancel).await?.get(cancel).await
    }

    /// Type-check every package containing `uri`.
    pub async fn packages_for_file(
        &self,
        uri: &DocumentUri,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<TypeInfo>>, CacheError> {
        let graph = self.metadata_graph(cancel).await?;
        let mut packages = Vec::new();
        for id in graph.ids_for(uri) {
            packages.push(self.package(id, cancel).await?);
        }
        Ok(packages)
    }

    // Handles capture their inputs' promises, never the snapshot, so a handle
    // carried into a fork keeps nothing of its creator alive.
    fn build_package_handle(
        &self,
        graph: &MetadataGraph,
        id: &PackageId,
        visiting: &mut HashSet<PackageId>,
    ) -> Result<Promise<TypeInfo>, CacheError> {
        let metadata = graph.package(id).ok_or_else(|| CacheError::NoPackage(id.clone()))?.clone();

        visiting.insert(id.clone());
        let mut deps = Vec::with_capacity(metadata.deps.len());
        for dep in &metadata.deps {
            if visiting.contains(dep) {
                warn!("Import cycle: {} and {} import each other", id, dep);
                continue;
            }
            if graph.package(dep).is_none() {
                continue;
            }
            deps.push(self.build_package_handle(graph, dep, visiting)?);
        }
        visiting.remove(id);

        if let Some(entry) = self.maps.lock().packages.get(id) {
            if entry.is_current(&metadata, &deps) {
                return Ok(entry.handle.clone());
            }
        }

        let files: Vec<Promise<ParsedFile>> = metadata.files.iter().map(|uri| self.parse_handle(uri)).collect();
        let analyzer = self.env.analyzer.clone();
        let inputs = (metadata.clone(), deps.clone());
        let handle = Promise::new(format!("type-check {}", id), move |cancel| {
            let analyzer = analyzer.clone();
            let (metadata, deps) = inputs.clone();
            let files = files.clone();
            async move {
                let mut parsed = Vec::with_capacity(files.len());
                for file in &files {
                    parsed.push(file.get(&cancel).await?);
                }
                let mut checked = Vec::with_capacity(deps.len());
                for dep in &deps {
                    checked.push(dep.get(&cancel).await?);
                }
                let inputs = PackageInputs {
                    metadata,
                    files: parsed,
                    deps: checked,
                };
                analyzer.type_check(&inputs, &cancel).await.map_err(CacheError::from)
            }
        });

        let mut maps = self.maps.lock();
        if let Some(raced) = maps.packages.get(id) {
            if raced.is_current(&metadata, &deps) {
                return Ok(raced.handle.clone());
            }
        }
        maps.packages.set(
            id.clone(),
            PackageEntry {
                metadata,
                deps,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// The memoized parse of a workspace or module file.
    pub fn config_file(&self, uri: &DocumentUri) -> Promise<ConfigFile> {
        if let Some(handle) = self.maps.lock().config_handles.get(uri) {
            return handle.clone();
        }
        let file = self.read_file(uri);
        let handle = Promise::new(format!("config {:?}", uri), move |_cancel| {
            let config = ConfigFile::parse(file.as_ref());
            async move { Ok(config) }
        });

        let mut maps = self.maps.lock();
        if let Some(raced) = maps.config_handles.get(uri) {
            return raced.clone();
        }
        maps.config_handles.set(uri.clone(), handle.clone());
        handle
    }

    /// Problems with the files that define this view, as this snapshot sees them.
    pub async fn config_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>, CacheError> {
        let files = self.definition.definition_files();
        let mut diagnostics: Vec<Diagnostic> = self
            .definition
            .diagnostics
            .iter()
            .filter(|d| !files.contains(&d.uri))
            .cloned()
            .collect();
        for uri in &files {
            let config = self.config_file(uri).get(cancel).await?;
            diagnostics.extend(config.diagnostics.iter().cloned());
            for module in &config.modules {
                if !self.read_file(module).exists() {
                    diagnostics.push(missing_member(uri, module));
                }
            }
        }
        Ok(diagnostics)
    }

    /// Configuration and type-checking diagnostics for every real package.
    pub async fn diagnose(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>, CacheError> {
        let mut diagnostics = self.config_diagnostics(cancel).await?;
        let graph = self.metadata_graph(cancel).await?;
        for metadata in graph.packages().filter(|m| m.is_real()) {
            let info = self.package(&metadata.id, cancel).await?;
            diagnostics.extend(info.diagnostics.iter().cloned());
        }
        Ok(diagnostics)
    }

    /// Glob patterns for the files whose changes this view needs to hear about.
    pub fn file_watch_glob_patterns(&self) -> BTreeSet<String> {
        let extensions = format!("{{{},mod,work}}", SOURCE_EXTENSION);
        let recursive = self.definition.kind != ViewKind::AdHoc;
        self.roots()
            .iter()
            .map(|root| {
                let dir = root.path().display();
                if recursive {
                    format!("{}/**/*.{}", dir, extensions)
                } else {
                    format!("{}/*.{}", dir, extensions)
                }
            })
            .collect()
    }

    /// Diagnostics for open source files that no real package of this view contains.
    pub async fn orphaned_file_diagnostics(
        &self,
        overlays: &[Arc<Overlay>],
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CacheError> {
        let graph = match self.metadata_graph(cancel).await {
            Ok(graph) => graph,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!("Cannot look for orphaned files in {}: {}", self.definition, err);
                return Ok(Vec::new());
            }
        };

        let mut diagnostics = Vec::new();
        for overlay in overlays {
            let uri = overlay.uri();
            if overlay.kind() != FileKind::Source || graph.has_real_package(uri) {
                continue;
            }
            let path = uri.path().display();
            let message = if self.is_ignored(uri) {
                format!(
                    "{} is ignored by the build: path components starting with '.' or '_', \
                     and directories named testdata, are excluded",
                    path
                )
            } else if self.is_filtered(uri) {
                format!("{} is excluded by the folder's directory filters", path)
            } else {
                format!(
                    "No active builds contain {}: consider opening a new workspace folder containing it",
                    path
                )
            };
            diagnostics.push(
                Diagnostic::new(uri.clone(), Severity::Warning, message).with_source(DiagnosticSource::Orphaned),
            );
        }
        Ok(diagnostics)
    }

    /// Whether any file in `change` could affect this snapshot.
    pub(crate) fn is_relevant(&self, change: &StateChange) -> bool {
        let definition_files = self.definition.definition_files();
        let roots = self.roots();
        let graph = self.metadata.cached();
        let maps = self.maps.lock();
        change.files.keys().any(|uri| {
            maps.files.contains_key(uri)
                || definition_files.contains(uri)
                || roots.iter().any(|root| root.encloses(uri))
                || graph.as_ref().is_some_and(|graph| !graph.ids_for(uri).is_empty())
        })
    }

    /// Build the successor of this snapshot with `change` applied.
    ///
    /// Returns the new snapshot and whether the change affects this view's
    /// diagnostics.
    pub(crate) fn fork(
        &self,
        change: &StateChange,
        open_files: Arc<[DocumentUri]>,
        background: CancellationToken,
    ) -> (SnapshotRef, bool) {
        let mut maps = self.maps.lock().clone();
        let graph = self.metadata.cached();
        let definition_files = self.definition.definition_files();

        let mut needs_diagnosis = false;
        let mut reload = graph.is_none();
        let mut reset_packages = graph.is_none();
        let mut affected = Vec::new();

        for (uri, new) in &change.files {
            let old = maps
                .files
                .get(uri)
                .cloned()
                .or_else(|| self.metadata_reads.lock().get(uri).cloned());
            let kind = FileKind::for_uri(uri);

            if old.is_some() || definition_files.contains(uri) {
                needs_diagnosis = true;
            }
            if matches!(kind, FileKind::Module | FileKind::Workspace) {
                needs_diagnosis = true;
                reload = true;
                reset_packages = true;
            }
            if let Some(graph) = &graph {
                let ids = graph.ids_for(uri);
                if !ids.is_empty() {
                    needs_diagnosis = true;
                    affected.extend_from_slice(ids);
                } else if kind == FileKind::Source {
                    // A new file joins the packages of its directory.
                    let dir = uri.dir();
                    affected.extend(
                        graph
                            .packages()
                            .filter(|meta| meta.files.iter().any(|file| file.dir() == dir))
                            .map(|meta| meta.id.clone()),
                    );
                }
                if kind == FileKind::Source && (ids.is_empty() || self.header_changed(old.as_deref(), new.as_ref())) {
                    reload = true;
                }
            }

            maps.files.set(uri.clone(), new.clone());
            maps.parse_handles.delete(uri);
            maps.config_handles.delete(uri);
        }

        // Handles outside the reverse closure survive a reload too; they are
        // checked against the new graph when next requested.
        match &graph {
            Some(graph) if !reset_packages => {
                for id in graph.reverse_closure(&affected) {
                    maps.packages.delete(&id);
                }
            }
            _ => maps.packages.clear(),
        }

        let metadata = if reload {
            let reads = ReadLog::default();
            let promise = metadata_promise(&self.env, &self.definition, maps.files.clone(), open_files, reads.clone());
            (promise, reads)
        } else {
            (self.metadata.clone(), self.metadata_reads.clone())
        };

        let next = Snapshot::publish(
            self.view_id,
            self.definition.clone(),
            self.env.clone(),
            background,
            maps,
            metadata,
        );
        debug!(
            "Forked snapshot {} -> {} of view {} ({} files, reload: {})",
            self.sequence_id,
            next.sequence_id,
            self.view_id,
            change.files.len(),
            reload
        );
        (next, needs_diagnosis)
    }

    fn header_changed(&self, old: Option<&dyn FileHandle>, new: &dyn FileHandle) -> bool {
        let Some(old) = old else {
            return true;
        };
        match (old.content(), new.content()) {
            (Ok(old), Ok(new)) => self.env.analyzer.header_changed(&old, &new),
            (Err(_), Err(_)) => false,
            _ => true,
        }
    }

    /// Load the package graph, giving up if the snapshot is superseded.
    pub(crate) async fn initialize(&self, cancel: &CancellationToken) {
        let started = Instant::now();
        let result = tokio::select! {
            _ = self.background.cancelled() => Err(CacheError::Cancelled),
            result = self.metadata.get(cancel) => result,
        };
        match result {
            Ok(graph) => info!(
                "Loaded {} in {:?}: {} packages",
                self.definition,
                started.elapsed(),
                graph.len()
            ),
            Err(err) if err.is_cancelled() => debug!("Abandoned initial load of {}", self.definition),
            Err(err) => warn!("Initial load of {} failed: {}", self.definition, err),
        }
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            bug!("snapshot {} of view {} destroyed twice", self.sequence_id, self.view_id);
            return;
        }
        self.background.cancel();
        debug!("Destroyed snapshot {} of view {}", self.sequence_id, self.view_id);
    }
}

fn metadata_promise(
    env: &Arc<ViewEnv>,
    definition: &Arc<ViewDefinition>,
    files: Map<DocumentUri, Arc<dyn FileHandle>>,
    open_files: Arc<[DocumentUri]>,
    reads: ReadLog,
) -> Promise<MetadataGraph> {
    let env = env.clone();
    let definition = definition.clone();
    Promise::new(format!("metadata of {}", definition), move |cancel| {
        let source = FrozenSource {
            files: files.clone(),
            live: env.fs.clone(),
            reads: reads.clone(),
        };
        let analyzer = env.analyzer.clone();
        let definition = definition.clone();
        let open_files = open_files.clone();
        async move {
            let graph = analyzer
                .compute_metadata(&definition, &source, &open_files, &cancel)
                .await?;
            Ok(graph)
        }
    })
}

/// A counted reference to a snapshot.
///
/// Cloning acquires a reference and dropping releases it. When the last
/// reference is released the snapshot is torn down: its background work is
/// cancelled. Reads through a snapshot are valid for as long as the caller
/// holds a reference, even after the view has moved on.
pub struct SnapshotRef {
    snapshot: Arc<Snapshot>,
}

impl SnapshotRef {
    /// Acquire another reference.
    pub fn acquire(&self) -> SnapshotRef {
        self.clone()
    }

    /// Release this reference.
    pub fn release(self) {
        drop(self)
    }

    /// Whether two references denote the same snapshot.
    pub fn ptr_eq(a: &SnapshotRef, b: &SnapshotRef) -> bool {
        Arc::ptr_eq(&a.snapshot, &b.snapshot)
    }

    /// An uncounted handle, for observing a snapshot after releasing it.
    #[cfg(test)]
    pub(crate) fn observe(&self) -> Arc<Snapshot> {
        self.snapshot.clone()
    }
}

impl Clone for SnapshotRef {
    fn clone(&self) -> Self {
        self.snapshot.refcount.fetch_add(1, Ordering::AcqRel);
        SnapshotRef {
            snapshot: self.snapshot.clone(),
        }
    }
}

impl Drop for SnapshotRef {
    fn drop(&mut self) {
        if self.snapshot.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.snapshot.destroy();
        }
    }
}

impl Deref for SnapshotRef {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl fmt::Debug for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.snapshot, f)
    }
}
