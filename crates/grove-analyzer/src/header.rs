//! Line-oriented source scanning

use grove_core::diagnostic::{DiagnosticSource, Severity};
use grove_core::{Diagnostic, DocumentUri};

/// Marker comment for files built on their own rather than with their directory.
pub const STANDALONE_MARKER: &str = "// grove:standalone";

/// What the leading lines of a file declare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub package: Option<String>,
    /// Import paths with their zero-based lines.
    pub imports: Vec<(u32, String)>,
    pub standalone: bool,
    /// Lines that look like imports but cannot be read.
    pub malformed: Vec<u32>,
}

impl Header {
    pub fn import_paths(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|(_, path)| path.as_str())
    }
}

pub fn parse_header(text: &str) -> Header {
    let mut header = Header::default();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        let number = number as u32;
        if line.is_empty() {
            continue;
        }
        if line == STANDALONE_MARKER {
            header.standalone = true;
        } else if line.starts_with("//") {
            continue;
        } else if let Some(name) = line.strip_prefix("package ") {
            header.package.get_or_insert_with(|| name.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("import ") {
            match unquote(rest.trim()) {
                Some(path) => header.imports.push((number, path.to_string())),
                None => header.malformed.push(number),
            }
        } else {
            break;
        }
    }
    header
}

/// Top-level declarations, in file order, with their lines.
pub fn declarations(text: &str) -> Vec<(u32, String)> {
    let mut symbols = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let Some(rest) = ["fn ", "type ", "const "].iter().find_map(|kw| line.strip_prefix(kw)) else {
            continue;
        };
        let name: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        if !name.is_empty() {
            symbols.push((number as u32, name));
        }
    }
    symbols
}

/// Diagnostics for the header of `uri`.
pub fn header_diagnostics(uri: &DocumentUri, header: &Header) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = header
        .malformed
        .iter()
        .map(|line| {
            Diagnostic::new(uri.clone(), Severity::Error, "malformed import: expected a quoted path")
                .with_source(DiagnosticSource::Analysis)
                .at_line(*line)
        })
        .collect();
    if header.package.is_none() {
        diagnostics.push(
            Diagnostic::new(uri.clone(), Severity::Warning, "missing package clause")
                .with_source(DiagnosticSource::Analysis),
        );
    }
    diagnostics
}

fn unquote(s: &str) -> Option<&str> {
    s.strip_prefix('"')?.strip_suffix('"').filter(|path| !path.is_empty())
}
