//! Grove Core — shared vocabulary for the workspace cache

pub mod analyzer;
pub mod bug;
pub mod definition;
pub mod diagnostic;
pub mod file;
pub mod filter;
pub mod fs;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod uri;

pub use analyzer::{AnalysisError, Analyzer, PackageInputs, ParsedFile, TypeInfo};
pub use definition::{ViewDefinition, ViewKind};
pub use diagnostic::{Diagnostic, DiagnosticSource, Severity};
pub use file::{Action, BrokenFile, ContentHash, DiskFile, FileError, FileHandle, FileIdentity, FileKind, Modification};
pub use filter::Filterer;
pub use fs::{DiskFs, FileSource, MemFs};
pub use layout::{CONFIG_FILE, MODULE_FILE, SOURCE_EXTENSION, WORKSPACE_FILE, find_root_pattern};
pub use metadata::{MetadataGraph, PackageId, PackageMetadata};
pub use options::{ConfigError, Folder, Options};
pub use uri::DocumentUri;
