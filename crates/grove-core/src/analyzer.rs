//! The boundary to the semantic analyzer
//!
//! The cache never interprets source code itself. It asks an [`Analyzer`] for
//! a view's dependency graph, for parsed files, and for type-checked
//! packages, and memoizes whatever comes back.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::definition::ViewDefinition;
use crate::diagnostic::Diagnostic;
use crate::file::{ContentHash, FileHandle};
use crate::fs::FileSource;
use crate::metadata::{MetadataGraph, PackageId, PackageMetadata};
use crate::uri::DocumentUri;

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("analysis cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// The syntactic summary of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub uri: DocumentUri,
    pub hash: ContentHash,
    /// Import paths declared by the file header.
    pub imports: Vec<String>,
    /// Top-level declarations.
    pub symbols: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything type checking a package may depend on.
#[derive(Debug, Clone)]
pub struct PackageInputs {
    pub metadata: Arc<PackageMetadata>,
    pub files: Vec<Arc<ParsedFile>>,
    /// Results for the direct dependencies present in the graph, in `metadata.deps` order.
    pub deps: Vec<Arc<TypeInfo>>,
}

/// The result of type checking one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: PackageId,
    /// Names visible to importers.
    pub exported: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The external semantic analyzer.
///
/// Every method must be a pure function of its arguments so that results can
/// be memoized. Implementations should check `cancel` between units of work
/// and return [`AnalysisError::Cancelled`] promptly.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Compute the package graph of a view.
    ///
    /// `open_files` lists files open in the editor; files that no real package
    /// contains should be given a synthetic single-file package.
    async fn compute_metadata(
        &self,
        definition: &ViewDefinition,
        fs: &dyn FileSource,
        open_files: &[DocumentUri],
        cancel: &CancellationToken,
    ) -> Result<MetadataGraph, AnalysisError>;

    async fn parse_file(&self, file: &dyn FileHandle, cancel: &CancellationToken) -> Result<ParsedFile, AnalysisError>;

    async fn type_check(&self, inputs: &PackageInputs, cancel: &CancellationToken) -> Result<TypeInfo, AnalysisError>;

    /// Whether a content change could alter the package graph.
    fn header_changed(&self, old: &[u8], new: &[u8]) -> bool {
        old != new
    }
}
