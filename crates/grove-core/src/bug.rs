//! Non-fatal reporting of broken invariants
//!
//! Code paths that "should not happen" report here and carry on. A report is
//! logged at error level under the `grove::bug` target and counted, so tests
//! can assert that an operation did (or did not) trip an invariant.

use std::sync::atomic::{AtomicUsize, Ordering};

static REPORTS: AtomicUsize = AtomicUsize::new(0);

/// Record a broken invariant.
pub fn report(message: impl AsRef<str>) {
    REPORTS.fetch_add(1, Ordering::Relaxed);
    tracing::error!(target: "grove::bug", "bug: {}", message.as_ref());
}

/// Number of reports since process start.
pub fn count() -> usize {
    REPORTS.load(Ordering::Relaxed)
}

/// Format and record a broken invariant.
#[macro_export]
macro_rules! bug {
    ($($arg:tt)*) => {
        $crate::bug::report(format!($($arg)*))
    };
}
