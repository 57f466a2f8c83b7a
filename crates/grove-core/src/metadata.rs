//! Package metadata produced by the analyzer

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::uri::DocumentUri;

const SYNTHETIC_PREFIX: &str = "synthetic:";

/// Identifies one package within a view.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId(Arc<str>);

impl PackageId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        PackageId(id.into())
    }

    /// The id of a single-file package built for a file no real package contains.
    pub fn synthetic(uri: &DocumentUri) -> Self {
        PackageId(format!("{}{}", SYNTHETIC_PREFIX, uri.path().display()).into())
    }

    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the analyzer knows about one package before type checking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    pub id: PackageId,
    pub name: String,
    pub files: Vec<DocumentUri>,
    /// Direct dependencies.
    pub deps: Vec<PackageId>,
    /// A synthetic package the user explicitly asked to build on its own.
    pub standalone: bool,
}

impl PackageMetadata {
    /// Whether this is a package of the build, as opposed to a synthetic single-file one.
    pub fn is_real(&self) -> bool {
        !self.id.is_synthetic() || self.standalone
    }
}

/// The dependency graph of one view.
#[derive(Debug, Clone, Default)]
pub struct MetadataGraph {
    packages: BTreeMap<PackageId, Arc<PackageMetadata>>,
    ids: HashMap<DocumentUri, Vec<PackageId>>,
    importers: HashMap<PackageId, Vec<PackageId>>,
}

impl MetadataGraph {
    pub fn new(packages: impl IntoIterator<Item = PackageMetadata>) -> Self {
        let mut graph = MetadataGraph::default();
        for package in packages {
            for file in &package.files {
                graph.ids.entry(file.clone()).or_default().push(package.id.clone());
            }
            for dep in &package.deps {
                graph.importers.entry(dep.clone()).or_default().push(package.id.clone());
            }
            graph.packages.insert(package.id.clone(), Arc::new(package));
        }
        graph
    }

    pub fn package(&self, id: &PackageId) -> Option<&Arc<PackageMetadata>> {
        self.packages.get(id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Arc<PackageMetadata>> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages containing `uri`.
    pub fn ids_for(&self, uri: &DocumentUri) -> &[PackageId] {
        self.ids.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every file that belongs to some package.
    pub fn files(&self) -> impl Iterator<Item = &DocumentUri> {
        self.ids.keys()
    }

    /// Whether some non-synthetic package contains `uri`.
    pub fn has_real_package(&self, uri: &DocumentUri) -> bool {
        self.ids_for(uri)
            .iter()
            .filter_map(|id| self.packages.get(id))
            .any(|meta| meta.is_real())
    }

    /// `roots` plus every package that transitively depends on one of them.
    pub fn reverse_closure<'a>(&self, roots: impl IntoIterator<Item = &'a PackageId>) -> HashSet<PackageId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<PackageId> = roots.into_iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(importers) = self.importers.get(&id) {
                queue.extend(importers.iter().cloned());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(id: &str, files: &[&str], deps: &[&str]) -> PackageMetadata {
        PackageMetadata {
            id: PackageId::new(id),
            name: id.to_string(),
            files: files.iter().map(DocumentUri::from_path).collect(),
            deps: deps.iter().map(|d| PackageId::new(*d)).collect(),
            standalone: false,
        }
    }

    #[test]
    fn test_reverse_closure_is_transitive() {
        let graph = MetadataGraph::new([
            package("a", &["/w/a/a.gv"], &[]),
            package("b", &["/w/b/b.gv"], &["a"]),
            package("c", &["/w/c/c.gv"], &["b"]),
            package("d", &["/w/d/d.gv"], &[]),
        ]);
        let affected = graph.reverse_closure(&[PackageId::new("a")]);
        assert_eq!(affected.len(), 3);
        assert!(!affected.contains(&PackageId::new("d")));
    }

    #[test]
    fn test_synthetic_packages_are_not_real() {
        let uri = DocumentUri::from_path("/w/orphan.gv");
        let mut synthetic = package("ignored", &["/w/orphan.gv"], &[]);
        synthetic.id = PackageId::synthetic(&uri);
        let graph = MetadataGraph::new([synthetic]);

        assert!(graph.ids_for(&uri)[0].is_synthetic());
        assert!(!graph.has_real_package(&uri));
    }
}
