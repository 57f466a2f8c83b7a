//! Reference analyzer for grove sources
//!
//! Packages are directories of `.gv` files. A file's header is its leading
//! run of comments, `package` clauses, and `import "path"` lines; the rest of
//! the file is scanned for `fn`, `type`, and `const` declarations.

pub mod analyzer;
pub mod checker;
pub mod header;
pub mod loader;


pub use analyzer::DirectoryAnalyzer;
pub use header::{Header, parse_header};
