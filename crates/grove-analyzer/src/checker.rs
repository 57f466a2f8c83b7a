//! Package-level checks over parsed files

use std::collections::{BTreeMap, BTreeSet};

use grove_core::{Diagnostic, DiagnosticSource, DocumentUri, PackageInputs, Severity, TypeInfo};

/// Check one package given its parsed files and its dependencies' results.
///
/// Exported names are the declarations that start with an uppercase letter.
pub(crate) fn check(inputs: &PackageInputs) -> TypeInfo {
    let metadata = &inputs.metadata;
    let mut diagnostics = Vec::new();
    let mut declared: BTreeMap<&str, usize> = BTreeMap::new();
    let resolved: BTreeSet<&str> = inputs.deps.iter().map(|dep| dep.id.as_str()).collect();

    for file in &inputs.files {
        diagnostics.extend(file.diagnostics.iter().cloned());
        for symbol in &file.symbols {
            let count = declared.entry(symbol.as_str()).or_default();
            *count += 1;
            if *count == 2 {
                diagnostics.push(analysis_error(
                    file.uri.clone(),
                    format!("{} redeclared in package {}", symbol, metadata.name),
                ));
            }
        }
        for import in &file.imports {
            if !resolved.contains(import.as_str()) {
                diagnostics.push(analysis_error(
                    file.uri.clone(),
                    format!("could not import {} (no package in the build)", import),
                ));
            }
        }
    }

    let exported = declared
        .keys()
        .filter(|name| name.starts_with(|c: char| c.is_uppercase()))
        .map(|name| name.to_string())
        .collect();

    TypeInfo {
        id: metadata.id.clone(),
        exported,
        diagnostics,
    }
}

fn analysis_error(uri: DocumentUri, message: String) -> Diagnostic {
    Diagnostic::new(uri, Severity::Error, message).with_source(DiagnosticSource::Analysis)
}
