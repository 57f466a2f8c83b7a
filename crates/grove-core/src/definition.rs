//! Build configuration descriptors

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostic::Diagnostic;
use crate::options::Folder;
use crate::uri::DocumentUri;

/// The kind of build a view represents, in order of selection precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ViewKind {
    /// Rooted at a workspace file that aggregates several modules.
    WorkspaceFile,
    /// Rooted at a single module file.
    ModuleFile,
    /// A directory inside a legacy path root.
    LegacyPath,
    /// Packages are reported by an external build driver.
    ExternalDriver,
    /// A bare directory of sources with no build configuration.
    AdHoc,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewKind::WorkspaceFile => "workspace-file",
            ViewKind::ModuleFile => "module-file",
            ViewKind::LegacyPath => "legacy-path",
            ViewKind::ExternalDriver => "external-driver",
            ViewKind::AdHoc => "ad-hoc",
        };
        f.write_str(name)
    }
}

/// An immutable description of one build configuration.
///
/// Definitions are compared structurally. When a view's recomputed definition
/// differs from its current one, the view is replaced, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewDefinition {
    pub kind: ViewKind,
    /// Directory the build is rooted at.
    pub root: DocumentUri,
    pub folder: Arc<Folder>,
    /// For `ModuleFile` views, the defining module file.
    pub module_file: Option<DocumentUri>,
    /// For `WorkspaceFile` views, the defining workspace file.
    pub workspace_file: Option<DocumentUri>,
    /// For `WorkspaceFile` views, the module files the workspace aggregates.
    pub workspace_modules: BTreeSet<DocumentUri>,
    /// For `ExternalDriver` views, the driver command.
    pub driver: Option<String>,
    /// Configuration problems found while defining the view.
    pub diagnostics: Vec<Diagnostic>,
}

impl ViewDefinition {
    /// A definition of the given kind with no kind-specific paths.
    pub fn new(kind: ViewKind, root: DocumentUri, folder: Arc<Folder>) -> Self {
        ViewDefinition {
            kind,
            root,
            folder,
            module_file: None,
            workspace_file: None,
            workspace_modules: BTreeSet::new(),
            driver: None,
            diagnostics: Vec::new(),
        }
    }

    /// Directories of the modules this view builds.
    pub fn module_dirs(&self) -> Vec<DocumentUri> {
        match self.kind {
            ViewKind::WorkspaceFile => self.workspace_modules.iter().map(DocumentUri::dir).collect(),
            ViewKind::ModuleFile => self.module_file.iter().map(DocumentUri::dir).collect(),
            _ => Vec::new(),
        }
    }

    /// Files whose on-disk change can alter this definition.
    pub fn definition_files(&self) -> Vec<DocumentUri> {
        self.workspace_file
            .iter()
            .chain(self.module_file.iter())
            .chain(self.workspace_modules.iter())
            .cloned()
            .collect()
    }
}

impl fmt::Display for ViewDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} view at {:?}", self.kind, self.root)
    }
}
