//! Cache error types

use grove_core::{AnalysisError, DocumentUri, PackageId};
use thiserror::Error;

use crate::overlay::OverlayError;
use crate::view::ViewId;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("view {0} is shut down")]
    ViewShutdown(ViewId),
    #[error("no views")]
    NoViews,
    #[error("session is shut down")]
    SessionShutdown,
    #[error("a view already exists for {0:?}")]
    ViewExists(DocumentUri),
    #[error("no view with id {0}")]
    UnknownView(ViewId),
    #[error("no package {0} in the build")]
    NoPackage(PackageId),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error("analysis failed: {0}")]
    Analysis(String),
}

impl CacheError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}

impl From<AnalysisError> for CacheError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Cancelled => CacheError::Cancelled,
            AnalysisError::Failed(message) => CacheError::Analysis(message),
        }
    }
}
