//! Directory include/exclude filters

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tracing::warn;

struct Rule {
    matcher: GlobMatcher,
    include: bool,
}

/// Evaluates `+glob` / `-glob` directory filters; the last matching rule wins.
///
/// A directory excluded by a rule excludes everything beneath it.
pub struct Filterer {
    rules: Vec<Rule>,
}

impl Filterer {
    pub fn new(filters: &[String]) -> Self {
        let mut rules = Vec::new();
        for filter in filters {
            let (include, pattern) = match filter.strip_prefix('+') {
                Some(rest) => (true, rest),
                None => (false, filter.strip_prefix('-').unwrap_or(filter)),
            };
            let pattern = pattern.trim_end_matches('/');
            match Glob::new(pattern) {
                Ok(glob) => rules.push(Rule {
                    matcher: glob.compile_matcher(),
                    include,
                }),
                Err(err) => warn!("Ignoring invalid directory filter {:?}: {}", filter, err),
            }
        }
        Filterer { rules }
    }

    /// Reports whether the relative path `rel` is excluded.
    pub fn disallow(&self, rel: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let mut prefix = PathBuf::new();
        for component in rel.components() {
            prefix.push(component);
            if self.excluded(&prefix) {
                return true;
            }
        }
        false
    }

    fn excluded(&self, path: &Path) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matcher.is_match(path))
            .is_some_and(|rule| !rule.include)
    }
}
