//! Package discovery for a view

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use grove_core::layout::{MODULE_FILE, parse_module_file};
use grove_core::{
    AnalysisError, DocumentUri, FileSource, Filterer, MetadataGraph, PackageId, PackageMetadata, SOURCE_EXTENSION,
    ViewDefinition, ViewKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::header::{Header, parse_header};

/// A directory tree whose packages share an import path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PackageRoot {
    pub dir: DocumentUri,
    pub prefix: String,
    /// Whether subdirectories hold packages too.
    pub recursive: bool,
}

impl PackageRoot {
    fn package_id(&self, dir: &DocumentUri) -> Option<PackageId> {
        let rel = dir.path().strip_prefix(self.dir.path()).ok()?;
        let rel = rel.to_string_lossy();
        let id = match (self.prefix.is_empty(), rel.is_empty()) {
            (_, true) => self.prefix.clone(),
            (true, false) => rel.into_owned(),
            (false, false) => format!("{}/{}", self.prefix, rel),
        };
        Some(PackageId::new(if id.is_empty() { ".".to_string() } else { id }))
    }
}

/// The package roots a definition builds.
pub(crate) fn package_roots(definition: &ViewDefinition, fs: &dyn FileSource) -> Vec<PackageRoot> {
    match definition.kind {
        ViewKind::WorkspaceFile | ViewKind::ModuleFile => {
            let module_files: Vec<&DocumentUri> = match definition.kind {
                ViewKind::WorkspaceFile => definition.workspace_modules.iter().collect(),
                _ => definition.module_file.iter().collect(),
            };
            module_files
                .into_iter()
                .filter_map(|module_file| {
                    let content = fs.read_file(module_file).content().ok()?;
                    let dir = module_file.dir();
                    let prefix = parse_module_file(module_file, &content)
                        .module_path
                        .unwrap_or_else(|| dir.base_name().unwrap_or_default().to_string());
                    Some(PackageRoot { dir, prefix, recursive: true })
                })
                .collect()
        }
        ViewKind::LegacyPath => definition
            .folder
            .options
            .legacy_path
            .iter()
            .map(|root| DocumentUri::from_path(root).join("src"))
            .filter(|src| src.encloses(&definition.root))
            .map(|src| {
                let prefix = definition
                    .root
                    .path()
                    .strip_prefix(src.path())
                    .map(|rel| rel.to_string_lossy().into_owned())
                    .unwrap_or_default();
                PackageRoot {
                    dir: definition.root.clone(),
                    prefix,
                    recursive: true,
                }
            })
            .collect(),
        ViewKind::ExternalDriver => vec![PackageRoot {
            dir: definition.root.clone(),
            prefix: String::new(),
            recursive: true,
        }],
        ViewKind::AdHoc => vec![PackageRoot {
            dir: definition.root.clone(),
            prefix: definition.root.path().to_string_lossy().into_owned(),
            recursive: false,
        }],
    }
}

struct PackageBuilder {
    name: Option<String>,
    files: Vec<DocumentUri>,
    imports: BTreeSet<String>,
}

/// Discover the packages of `definition`.
pub(crate) fn load(
    definition: &ViewDefinition,
    fs: &dyn FileSource,
    open_files: &[DocumentUri],
    cancel: &CancellationToken,
) -> Result<MetadataGraph, AnalysisError> {
    let roots = package_roots(definition, fs);
    let filterer = Filterer::new(&definition.folder.options.directory_filters);
    let module_dirs: BTreeSet<DocumentUri> = roots.iter().map(|root| root.dir.clone()).collect();

    let mut packages: BTreeMap<PackageId, PackageBuilder> = BTreeMap::new();
    let mut headers: BTreeMap<DocumentUri, Header> = BTreeMap::new();

    for root in &roots {
        for uri in fs.files_under(&root.dir) {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            if !is_source(&uri) || !belongs_to(root, &uri, &module_dirs, fs) {
                continue;
            }
            let dir = uri.dir();
            if filtered(&filterer, definition, &dir) {
                trace!("Filtered {:?}", uri);
                continue;
            }
            let Some(id) = root.package_id(&dir) else {
                continue;
            };
            let header = read_header(fs, &uri);
            if header.standalone {
                headers.insert(uri, header);
                continue;
            }
            let package = packages.entry(id).or_insert_with(|| PackageBuilder {
                name: None,
                files: Vec::new(),
                imports: BTreeSet::new(),
            });
            if package.name.is_none() {
                package.name = header.package.clone();
            }
            package.imports.extend(header.import_paths().map(str::to_string));
            package.files.push(uri.clone());
            headers.insert(uri, header);
        }
    }

    let known: BTreeSet<PackageId> = packages.keys().cloned().collect();

    let mut metadata: Vec<PackageMetadata> = packages
        .iter()
        .map(|(id, package)| PackageMetadata {
            id: id.clone(),
            name: package.name.clone().unwrap_or_else(|| default_name(id)),
            files: package.files.clone(),
            deps: resolve_deps(&known, package.imports.iter().map(String::as_str))
                .into_iter()
                .filter(|dep| dep != id)
                .collect(),
            standalone: false,
        })
        .collect();

    let contained: BTreeSet<&DocumentUri> = packages.values().flat_map(|p| p.files.iter()).collect();
    for uri in open_files {
        if contained.contains(uri) || !is_source(uri) || !roots.iter().any(|root| root.dir.encloses(uri)) {
            continue;
        }
        if !fs.exists(uri) {
            continue;
        }
        let header = match headers.get(uri) {
            Some(header) => header.clone(),
            None => read_header(fs, uri),
        };
        let id = PackageId::synthetic(uri);
        metadata.push(PackageMetadata {
            name: header.package.clone().unwrap_or_else(|| default_name(&id)),
            deps: resolve_deps(&known, header.import_paths()),
            files: vec![uri.clone()],
            standalone: header.standalone,
            id,
        });
    }

    debug!("Loaded {} packages for {}", metadata.len(), definition);
    Ok(MetadataGraph::new(metadata))
}

/// Imports that name a package of the graph, deduplicated and sorted.
fn resolve_deps<'a>(known: &BTreeSet<PackageId>, imports: impl Iterator<Item = &'a str>) -> Vec<PackageId> {
    let deps: BTreeSet<PackageId> = imports.map(PackageId::new).filter(|id| known.contains(id)).collect();
    deps.into_iter().collect()
}

fn is_source(uri: &DocumentUri) -> bool {
    uri.extension() == Some(SOURCE_EXTENSION)
}

/// Whether `uri` is built by `root`: in its tree, not in a nested module, and
/// not under a conventionally ignored directory.
fn belongs_to(root: &PackageRoot, uri: &DocumentUri, module_dirs: &BTreeSet<DocumentUri>, fs: &dyn FileSource) -> bool {
    let file_dir = uri.dir();
    let Ok(rel) = file_dir.path().strip_prefix(root.dir.path()) else {
        return false;
    };
    if !root.recursive {
        return rel.as_os_str().is_empty();
    }
    if has_ignored_component(rel) {
        return false;
    }
    // The nearest enclosing module directory must be this root.
    let mut dir = file_dir.clone();
    while dir != root.dir {
        if module_dirs.contains(&dir) || fs.exists(&dir.join(MODULE_FILE)) {
            return false;
        }
        let parent = dir.dir();
        if parent == dir {
            return false;
        }
        dir = parent;
    }
    true
}

fn has_ignored_component(rel: &Path) -> bool {
    rel.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name.starts_with('_') || name == "testdata"
        }
        _ => false,
    })
}

fn filtered(filterer: &Filterer, definition: &ViewDefinition, dir: &DocumentUri) -> bool {
    match dir.path().strip_prefix(definition.folder.dir.path()) {
        Ok(rel) => filterer.disallow(rel),
        Err(_) => false,
    }
}

fn read_header(fs: &dyn FileSource, uri: &DocumentUri) -> Header {
    match fs.read_file(uri).content() {
        Ok(content) => parse_header(&String::from_utf8_lossy(&content)),
        Err(_) => Header::default(),
    }
}

fn default_name(id: &PackageId) -> String {
    id.as_str()
        .rsplit(['/', ':'])
        .next()
        .map(|last| last.trim_end_matches(".gv").to_string())
        .unwrap_or_default()
}
