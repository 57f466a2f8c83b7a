//! Grove Watcher — feeds on-disk changes into a session

pub mod filter;
pub mod watcher;

pub use filter::WatchFilter;
pub use watcher::{FileWatcher, WatchEvent, WatcherService};
