//! Which paths the session wants to hear about

use std::collections::BTreeSet;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Matches paths against a session's watch patterns.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    globs: GlobSet,
    patterns: BTreeSet<String>,
}

impl WatchFilter {
    /// Compile `patterns`. A single `*` never matches a path separator, so
    /// `dir/*.gv` covers only the files directly in `dir`.
    pub fn new(patterns: &BTreeSet<String>) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!("Skipping invalid watch pattern {:?}: {}", pattern, e),
            }
        }
        let globs = builder.build().unwrap_or_else(|e| {
            warn!("Failed to compile watch patterns: {}", e);
            GlobSet::empty()
        });
        WatchFilter {
            globs,
            patterns: patterns.clone(),
        }
    }

    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.globs.is_match(path)
    }

    /// Whether an event for `path` should be forwarded. Paths without an
    /// extension may be directories and are let through for expansion.
    pub fn admits(&self, path: &Path) -> bool {
        self.matches(path) || path.extension().is_none()
    }
}

/// Check if a path should be ignored (e.g., target/, .git/, etc.)
pub fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(component.as_os_str().to_str(), Some("target" | ".git" | "node_modules"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> WatchFilter {
        WatchFilter::new(&patterns.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_matches_session_patterns() {
        let filter = filter(&["**/{grove.mod,grove.work}", "/w/**/*.{gv,mod,work}", "/adhoc/*.{gv,mod,work}"]);
        assert!(filter.matches(Path::new("/w/pkg/a.gv")));
        assert!(filter.matches(Path::new("/elsewhere/grove.mod")));
        assert!(filter.matches(Path::new("/adhoc/x.gv")));
        assert!(!filter.matches(Path::new("/adhoc/sub/x.gv")));
        assert!(!filter.matches(Path::new("/w/README.md")));
    }

    #[test]
    fn test_recursive_patterns_cross_directories() {
        let filter = filter(&["/w/**/*.{gv,mod,work}", "/adhoc/*.{gv,mod,work}"]);
        assert!(filter.matches(Path::new("/w/a.gv")));
        assert!(filter.matches(Path::new("/w/deep/er/a.gv")));
        assert!(!filter.matches(Path::new("/adhoc/sub/deeper/x.gv")));
        assert!(!filter.matches(Path::new("/adhoc/sub/grove.mod")));
    }

    #[test]
    fn test_admits_possible_directories() {
        let filter = filter(&["/w/**/*.gv"]);
        assert!(filter.admits(Path::new("/w/pkg")));
        assert!(!filter.admits(Path::new("/w/notes.txt")));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let filter = filter(&["/w/**/*.gv", "/w/[unclosed"]);
        assert!(filter.matches(Path::new("/w/a.gv")));
        assert_eq!(filter.patterns().len(), 2);
    }

    #[test]
    fn test_should_ignore_path() {
        assert!(should_ignore_path(Path::new("/w/.git/index")));
        assert!(should_ignore_path(Path::new("/w/target/debug/x")));
        assert!(!should_ignore_path(Path::new("/w/src/a.gv")));
    }
}
