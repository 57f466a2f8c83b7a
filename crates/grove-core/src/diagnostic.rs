//! User-visible diagnostics

use serde::Serialize;

use crate::uri::DocumentUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

/// Where a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticSource {
    /// Problems with workspace or module definition files.
    Configuration,
    /// Files that no build contains.
    Orphaned,
    /// Reported by the analyzer.
    Analysis,
}

/// A message attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub uri: DocumentUri,
    pub severity: Severity,
    pub source: DiagnosticSource,
    /// Zero-based line the message refers to, when known.
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    /// A configuration diagnostic covering the whole file.
    pub fn new(uri: DocumentUri, severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            uri,
            severity,
            source: DiagnosticSource::Configuration,
            line: None,
            message: message.into(),
        }
    }

    pub fn with_source(mut self, source: DiagnosticSource) -> Self {
        self.source = source;
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}
