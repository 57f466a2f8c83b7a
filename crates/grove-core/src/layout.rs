//! Workspace and module file detection

use serde::Deserialize;

use crate::diagnostic::{Diagnostic, Severity};
use crate::fs::FileSource;
use crate::uri::DocumentUri;

/// Workspace definition file: aggregates several modules.
pub const WORKSPACE_FILE: &str = "grove.work";

/// Module definition file: marks the root of one module.
pub const MODULE_FILE: &str = "grove.mod";

/// Per-folder configuration file.
pub const CONFIG_FILE: &str = ".grove.toml";

/// Extension of source files.
pub const SOURCE_EXTENSION: &str = "gv";

pub fn is_workspace_file(uri: &DocumentUri) -> bool {
    uri.base_name() == Some(WORKSPACE_FILE)
}

pub fn is_module_file(uri: &DocumentUri) -> bool {
    uri.base_name() == Some(MODULE_FILE)
}

/// Search `dir` and its ancestors for a file named `basename`.
///
/// Returns the URI of the nearest match.
pub fn find_root_pattern(dir: &DocumentUri, basename: &str, fs: &dyn FileSource) -> Option<DocumentUri> {
    let mut dir = dir.clone();
    loop {
        let candidate = dir.join(basename);
        if fs.exists(&candidate) {
            return Some(candidate);
        }
        let parent = dir.dir();
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceFileToml {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModuleFileToml {
    module: String,
}

/// Parsed content of a workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceManifest {
    /// Module files aggregated by the workspace, resolved against its directory.
    pub modules: Vec<DocumentUri>,
    /// Problems found while parsing.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a workspace file's content.
///
/// Malformed content yields an empty manifest carrying a diagnostic.
pub fn parse_workspace_file(uri: &DocumentUri, content: &[u8]) -> WorkspaceManifest {
    let dir = uri.dir();
    let parsed = std::str::from_utf8(content)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str::<WorkspaceFileToml>(text).map_err(|e| e.message().to_string()));
    match parsed {
        Ok(manifest) => WorkspaceManifest {
            modules: manifest
                .members
                .iter()
                .map(|member| dir.join(member).join(MODULE_FILE))
                .collect(),
            diagnostics: Vec::new(),
        },
        Err(message) => WorkspaceManifest {
            modules: Vec::new(),
            diagnostics: vec![Diagnostic::new(
                uri.clone(),
                Severity::Error,
                format!("malformed {}: {}", WORKSPACE_FILE, message),
            )],
        },
    }
}

/// Parsed content of a module file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleManifest {
    pub module_path: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse_module_file(uri: &DocumentUri, content: &[u8]) -> ModuleManifest {
    let parsed = std::str::from_utf8(content)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str::<ModuleFileToml>(text).map_err(|e| e.message().to_string()));
    match parsed {
        Ok(manifest) => ModuleManifest {
            module_path: Some(manifest.module),
            diagnostics: Vec::new(),
        },
        Err(message) => ModuleManifest {
            module_path: None,
            diagnostics: vec![Diagnostic::new(
                uri.clone(),
                Severity::Error,
                format!("malformed {}: {}", MODULE_FILE, message),
            )],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn test_find_root_pattern_prefers_nearest() {
        let fs = MemFs::with_files(&[
            ("/w/grove.mod", "module = \"w\""),
            ("/w/inner/grove.mod", "module = \"w/inner\""),
        ]);
        let found = find_root_pattern(&DocumentUri::from_path("/w/inner/deep"), MODULE_FILE, &fs);
        assert_eq!(found, Some(DocumentUri::from_path("/w/inner/grove.mod")));

        let found = find_root_pattern(&DocumentUri::from_path("/w/other"), MODULE_FILE, &fs);
        assert_eq!(found, Some(DocumentUri::from_path("/w/grove.mod")));

        assert_eq!(find_root_pattern(&DocumentUri::from_path("/elsewhere"), MODULE_FILE, &fs), None);
    }

    #[test]
    fn test_parse_workspace_members() {
        let uri = DocumentUri::from_path("/w/grove.work");
        let manifest = parse_workspace_file(&uri, br#"members = ["a", "libs/b"]"#);
        assert!(manifest.diagnostics.is_empty());
        assert_eq!(
            manifest.modules,
            vec![
                DocumentUri::from_path("/w/a/grove.mod"),
                DocumentUri::from_path("/w/libs/b/grove.mod"),
            ]
        );
    }

    #[test]
    fn test_malformed_files_become_diagnostics() {
        let uri = DocumentUri::from_path("/w/grove.work");
        let manifest = parse_workspace_file(&uri, b"members = [");
        assert!(manifest.modules.is_empty());
        assert_eq!(manifest.diagnostics.len(), 1);
        assert_eq!(manifest.diagnostics[0].uri, uri);

        let uri = DocumentUri::from_path("/w/grove.mod");
        let manifest = parse_module_file(&uri, b"not toml at all =");
        assert_eq!(manifest.module_path, None);
        assert_eq!(manifest.diagnostics.len(), 1);
    }
}
