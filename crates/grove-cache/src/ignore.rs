//! Files the build never sees

use std::path::{Component, Path};

use grove_core::{DocumentUri, ViewDefinition, ViewKind};

/// Recognizes files that a view's build skips by naming convention: any path
/// component, relative to a build root, that starts with `.` or `_` or is
/// named `testdata`.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    roots: Vec<DocumentUri>,
}

impl IgnoreFilter {
    pub fn for_definition(definition: &ViewDefinition) -> Self {
        let roots = match definition.kind {
            ViewKind::WorkspaceFile | ViewKind::ModuleFile => definition.module_dirs(),
            ViewKind::LegacyPath => definition
                .folder
                .options
                .legacy_path
                .iter()
                .map(|root| DocumentUri::from_path(root).join("src"))
                .collect(),
            ViewKind::ExternalDriver | ViewKind::AdHoc => vec![definition.root.clone()],
        };
        IgnoreFilter { roots }
    }

    pub fn ignored(&self, uri: &DocumentUri) -> bool {
        self.roots.iter().any(|root| match uri.path().strip_prefix(root.path()) {
            Ok(rel) => has_ignored_component(rel),
            Err(_) => false,
        })
    }
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grove_core::{Folder, Options};

    use super::*;

    #[test]
    fn test_ignores_conventional_names_under_module() {
        let folder = Arc::new(Folder::new(DocumentUri::from_path("/w"), Options::default()));
        let mut definition = ViewDefinition::new(ViewKind::ModuleFile, DocumentUri::from_path("/w"), folder);
        definition.module_file = Some(DocumentUri::from_path("/w/grove.mod"));
        let filter = IgnoreFilter::for_definition(&definition);

        assert!(filter.ignored(&DocumentUri::from_path("/w/_scratch/a.gv")));
        assert!(filter.ignored(&DocumentUri::from_path("/w/pkg/testdata/a.gv")));
        assert!(filter.ignored(&DocumentUri::from_path("/w/.hidden.gv")));
        assert!(!filter.ignored(&DocumentUri::from_path("/w/pkg/a.gv")));
        // Components above the root do not count.
        assert!(!filter.ignored(&DocumentUri::from_path("/_other/pkg/a.gv")));
    }
}
