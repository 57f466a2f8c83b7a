//! [`Analyzer`] over directories of `.gv` files

use async_trait::async_trait;
use grove_core::{
    AnalysisError, Analyzer, Diagnostic, DiagnosticSource, DocumentUri, FileHandle, FileSource, MetadataGraph,
    PackageInputs, ParsedFile, Severity, TypeInfo, ViewDefinition,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::header::{declarations, header_diagnostics, parse_header};
use crate::{checker, loader};

/// Treats every directory as a package and import paths as package ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryAnalyzer;

impl DirectoryAnalyzer {
    pub fn new() -> Self {
        DirectoryAnalyzer
    }
}

#[async_trait]
impl Analyzer for DirectoryAnalyzer {
    async fn compute_metadata(
        &self,
        definition: &ViewDefinition,
        fs: &dyn FileSource,
        open_files: &[DocumentUri],
        cancel: &CancellationToken,
    ) -> Result<MetadataGraph, AnalysisError> {
        loader::load(definition, fs, open_files, cancel)
    }

    async fn parse_file(&self, file: &dyn FileHandle, cancel: &CancellationToken) -> Result<ParsedFile, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let uri = file.uri().clone();
        let hash = file.identity().hash;
        let content = file.content().map_err(|e| AnalysisError::Failed(e.to_string()))?;

        let text = match std::str::from_utf8(&content) {
            Ok(text) => text,
            Err(err) => {
                debug!("Non-UTF-8 source {:?}", uri);
                return Ok(ParsedFile {
                    diagnostics: vec![
                        Diagnostic::new(uri.clone(), Severity::Error, format!("invalid UTF-8: {}", err))
                            .with_source(DiagnosticSource::Analysis),
                    ],
                    uri,
                    hash,
                    imports: Vec::new(),
                    symbols: Vec::new(),
                });
            }
        };

        let header = parse_header(text);
        Ok(ParsedFile {
            diagnostics: header_diagnostics(&uri, &header),
            imports: header.import_paths().map(str::to_string).collect(),
            symbols: declarations(text).into_iter().map(|(_, name)| name).collect(),
            uri,
            hash,
        })
    }

    async fn type_check(&self, inputs: &PackageInputs, cancel: &CancellationToken) -> Result<TypeInfo, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(checker::check(inputs))
    }

    fn header_changed(&self, old: &[u8], new: &[u8]) -> bool {
        let old = parse_header(&String::from_utf8_lossy(old));
        let new = parse_header(&String::from_utf8_lossy(new));
        old.package != new.package
            || old.standalone != new.standalone
            || !old.import_paths().eq(new.import_paths())
    }
}
