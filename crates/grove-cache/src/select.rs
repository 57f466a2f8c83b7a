//! Defining views and choosing the best view for a file

use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

use grove_core::diagnostic::{Diagnostic, Severity};
use grove_core::layout::{parse_module_file, parse_workspace_file};
use grove_core::{
    DocumentUri, FileSource, Folder, MODULE_FILE, ViewDefinition, ViewKind, WORKSPACE_FILE, find_root_pattern,
};
use tracing::debug;

/// Compute the definition of the view that builds `for_file`, or the folder
/// itself when no file is given.
///
/// Configuration problems never fail this function: they are carried as
/// diagnostics on the resulting definition.
pub fn define_view(fs: &dyn FileSource, folder: &Arc<Folder>, for_file: Option<&DocumentUri>) -> ViewDefinition {
    let dir = match for_file {
        Some(uri) => uri.dir(),
        None => folder.dir.clone(),
    };
    let options = &folder.options;

    if let Some(driver) = &options.driver {
        let mut definition = ViewDefinition::new(ViewKind::ExternalDriver, dir, folder.clone());
        definition.driver = Some(driver.clone());
        return definition;
    }

    let mut diagnostics = Vec::new();
    let workspace_file = if options.workspace_file_disabled() {
        None
    } else if let Some(explicit) = &options.workspace_file {
        let uri = if Path::new(explicit).is_absolute() {
            DocumentUri::from_path(explicit)
        } else {
            folder.dir.join(explicit)
        };
        if fs.exists(&uri) {
            Some(uri)
        } else {
            diagnostics.push(Diagnostic::new(
                folder.dir.clone(),
                Severity::Error,
                format!("configured workspace file {:?} does not exist", uri),
            ));
            None
        }
    } else {
        find_root_pattern(&dir, WORKSPACE_FILE, fs)
    };

    if let Some(work) = workspace_file {
        let manifest = match fs.read_file(&work).content() {
            Ok(content) => parse_workspace_file(&work, &content),
            Err(err) => {
                debug!("Workspace file {:?} vanished while defining view: {}", work, err);
                Default::default()
            }
        };
        let mut definition = ViewDefinition::new(ViewKind::WorkspaceFile, work.dir(), folder.clone());
        for module in &manifest.modules {
            if !fs.exists(module) {
                diagnostics.push(missing_member(&work, module));
            }
        }
        definition.workspace_modules = manifest.modules.into_iter().collect();
        definition.workspace_file = Some(work);
        diagnostics.extend(manifest.diagnostics);
        definition.diagnostics = diagnostics;
        return definition;
    }

    if let Some(module) = find_root_pattern(&dir, MODULE_FILE, fs) {
        if let Ok(content) = fs.read_file(&module).content() {
            diagnostics.extend(parse_module_file(&module, &content).diagnostics);
        }
        let mut definition = ViewDefinition::new(ViewKind::ModuleFile, module.dir(), folder.clone());
        definition.module_file = Some(module);
        definition.diagnostics = diagnostics;
        return definition;
    }

    let in_legacy_root = options
        .legacy_path
        .iter()
        .any(|root| DocumentUri::from_path(root).join("src").encloses(&dir));
    let kind = if in_legacy_root { ViewKind::LegacyPath } else { ViewKind::AdHoc };
    let mut definition = ViewDefinition::new(kind, dir, folder.clone());
    definition.diagnostics = diagnostics;
    definition
}

/// Choose which of `definitions` should own `uri`, returning its index.
///
/// Workspace-file views win when they aggregate the file's module; then the
/// view of the file's nearest module; then the legacy or driver view with the
/// longest enclosing root; finally an ad-hoc view of exactly the file's
/// directory. The answer does not depend on the order of `definitions`.
pub fn best_view_def_for_uri(fs: &dyn FileSource, uri: &DocumentUri, definitions: &[Arc<ViewDefinition>]) -> Option<usize> {
    if definitions.is_empty() {
        return None;
    }
    let dir = uri.dir();
    let module = find_root_pattern(&dir, MODULE_FILE, fs);

    let matches = |definition: &ViewDefinition| match definition.kind {
        ViewKind::WorkspaceFile => {
            definition.workspace_file.as_ref() == Some(uri)
                || module.as_ref().is_some_and(|m| definition.workspace_modules.contains(m))
        }
        ViewKind::ModuleFile => module.is_some() && definition.module_file == module,
        ViewKind::LegacyPath | ViewKind::ExternalDriver => definition.root.encloses(&dir),
        ViewKind::AdHoc => definition.root == dir,
    };

    definitions
        .iter()
        .enumerate()
        .filter(|(_, definition)| matches(definition))
        .min_by_key(|(_, definition)| {
            (
                definition.kind,
                Reverse(definition.root.depth_key()),
                definition.folder.dir.clone(),
                definition.root.clone(),
            )
        })
        .map(|(index, _)| index)
}

/// Compute the initial definitions for a set of folders.
///
/// Each folder gets its own view. Open files inside a folder that no folder
/// view covers get a view of their own, unless it would duplicate an
/// existing definition. Open files outside every folder are left alone.
pub fn select_views(fs: &dyn FileSource, folders: &[Arc<Folder>], open_files: &[DocumentUri]) -> Vec<Arc<ViewDefinition>> {
    select_view_sources(fs, folders, open_files)
        .into_iter()
        .map(|(definition, _)| definition)
        .collect()
}

/// Like [`select_views`], pairing each definition with the open file it was
/// defined for, if any.
pub(crate) fn select_view_sources(
    fs: &dyn FileSource,
    folders: &[Arc<Folder>],
    open_files: &[DocumentUri],
) -> Vec<(Arc<ViewDefinition>, Option<DocumentUri>)> {
    let mut selected: Vec<(Arc<ViewDefinition>, Option<DocumentUri>)> = Vec::with_capacity(folders.len());
    for folder in folders {
        let definition = define_view(fs, folder, None);
        if !selected.iter().any(|(existing, _)| **existing == definition) {
            selected.push((Arc::new(definition), None));
        }
    }

    for uri in open_files {
        let Some(folder) = folder_for_file(folders, uri) else {
            continue;
        };
        let definitions: Vec<_> = selected.iter().map(|(definition, _)| definition.clone()).collect();
        if best_view_def_for_uri(fs, uri, &definitions).is_some() {
            continue;
        }
        let definition = define_view(fs, folder, Some(uri));
        if definitions.iter().any(|existing| **existing == definition) {
            continue;
        }
        debug!("Adding {} for open file {:?}", definition, uri);
        selected.push((Arc::new(definition), Some(uri.clone())));
    }
    selected
}

pub(crate) fn missing_member(workspace_file: &DocumentUri, module: &DocumentUri) -> Diagnostic {
    Diagnostic::new(
        workspace_file.clone(),
        Severity::Warning,
        format!("workspace member {:?} has no {}", module.dir(), MODULE_FILE),
    )
}

/// The innermost folder containing `uri`.
pub(crate) fn folder_for_file<'a>(folders: &'a [Arc<Folder>], uri: &DocumentUri) -> Option<&'a Arc<Folder>> {
    folders
        .iter()
        .filter(|folder| folder.dir.encloses(uri))
        .max_by_key(|folder| folder.dir.depth_key())
}
