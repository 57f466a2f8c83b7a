//! Shared fixtures for cache tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use grove_analyzer::DirectoryAnalyzer;
use grove_core::{
    AnalysisError, Analyzer, DocumentUri, FileHandle, FileSource, Folder, MemFs, MetadataGraph, Options,
    PackageInputs, ParsedFile, TypeInfo, ViewDefinition,
};
use tokio_util::sync::CancellationToken;

use crate::session::{Cache, Session};

pub(crate) const LANGUAGE: &str = "grove";

pub(crate) fn uri(path: &str) -> DocumentUri {
    DocumentUri::from_path(path)
}

pub(crate) fn folder(dir: &str) -> Folder {
    Folder::new(uri(dir), Options::default())
}

/// A [`DirectoryAnalyzer`] that counts its calls and can be slowed down.
#[derive(Default)]
pub(crate) struct CountingAnalyzer {
    inner: DirectoryAnalyzer,
    delay: Option<Duration>,
    pub metadata_calls: AtomicUsize,
    pub parse_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
}

impl CountingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        CountingAnalyzer {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), AnalysisError> {
        let Some(delay) = self.delay else {
            return Ok(());
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl Analyzer for CountingAnalyzer {
    async fn compute_metadata(
        &self,
        definition: &ViewDefinition,
        fs: &dyn FileSource,
        open_files: &[DocumentUri],
        cancel: &CancellationToken,
    ) -> Result<MetadataGraph, AnalysisError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(cancel).await?;
        self.inner.compute_metadata(definition, fs, open_files, cancel).await
    }

    async fn parse_file(&self, file: &dyn FileHandle, cancel: &CancellationToken) -> Result<ParsedFile, AnalysisError> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse_file(file, cancel).await
    }

    async fn type_check(&self, inputs: &PackageInputs, cancel: &CancellationToken) -> Result<TypeInfo, AnalysisError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.type_check(inputs, cancel).await
    }

    fn header_changed(&self, old: &[u8], new: &[u8]) -> bool {
        self.inner.header_changed(old, new)
    }
}

/// A session over an in-memory tree.
pub(crate) struct Fixture {
    pub fs: Arc<MemFs>,
    pub analyzer: Arc<CountingAnalyzer>,
    pub session: Session,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_analyzer(files, CountingAnalyzer::new())
    }

    pub fn with_analyzer(files: &[(&str, &str)], analyzer: CountingAnalyzer) -> Self {
        Self::with_cache(files, analyzer, Cache::new())
    }

    pub fn with_cache(files: &[(&str, &str)], analyzer: CountingAnalyzer, cache: Arc<Cache>) -> Self {
        let fs = Arc::new(MemFs::with_files(files));
        let analyzer = Arc::new(analyzer);
        let session = Session::new(cache, analyzer.clone(), fs.clone());
        Fixture { fs, analyzer, session }
    }
}
