//! Grove Cache — overlays, snapshots, views, and sessions
//!
//! A [`Session`] owns the editor's unsaved buffers and a set of [`View`]s,
//! one per build configuration. Each view publishes immutable [`Snapshot`]s;
//! a change forks the current snapshot, carrying forward every memoized
//! result the change cannot affect.

pub mod error;
pub mod ignore;
pub mod memoize;
pub mod overlay;
pub mod persistent;
pub mod select;
pub mod session;
pub mod snapshot;
pub mod view;

#[cfg(test)]
mod test_utils;

pub use error::CacheError;
pub use memoize::{Promise, Store, StoreKey};
pub use overlay::{Overlay, OverlayError, OverlayFs};
pub use select::{best_view_def_for_uri, define_view, select_views};
pub use session::{Cache, ModifyResult, Session, ViewDiagnosis};
pub use snapshot::{ConfigFile, Snapshot, SnapshotRef, StateChange};
pub use view::{View, ViewId, ViewState};
