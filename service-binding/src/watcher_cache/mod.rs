//! Watch-driven incremental cache of per-directory records.
//!
//! A [`WatcherCache`] loads each requested directory once through a
//! [`DirectoryLoader`] and serves the record from memory until a filesystem watch on
//! that directory reports a change. Watches are registered against a notifier shared by
//! every cache observing the same filesystem ([`NotifierRegistry`]).
//!
//! When the filesystem or its notifier is unavailable the cache keeps working: it loads
//! every directory directly and retries the watch a bounded number of times
//! ([`WatcherCacheBuilder::max_attempts`]). Only loader errors reach the caller.
//!
//! ```no_run
//! use service_binding::watcher_cache::WatcherCache;
//! use std::path::Path;
//!
//! let cache = WatcherCache::builder(|dir: &Path| -> Result<Option<u64>, std::io::Error> {
//!     Ok(Some(std::fs::metadata(dir)?.len()))
//! })
//! .build();
//!
//! let first = cache.get_bindings(["/bindings/db"])?;
//! let second = cache.get_bindings(["/bindings/db"])?; // served from memory
//! cache.release_resources();
//! # Ok::<(), std::io::Error>(())
//! ```

mod builder;
mod cache;
mod errors;
mod fs;
mod loader;
mod metrics;
#[cfg(feature = "watcher")]
pub mod native;
mod reconcile;
mod registry;
mod subscription;
mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{WatcherCacheBuilder, DEFAULT_MAX_ATTEMPTS};
pub use cache::{CacheStats, WatcherCache};
pub use errors::{MetricsErrorKind, WatchError};
pub use fs::{Filesystem, FilesystemId, FilesystemProvider, Notifier, WatchEventKind, WatchKey};
pub use loader::DirectoryLoader;
pub use metrics::MetricsRecorder;
pub use reconcile::WatchState;
pub use registry::{NotifierRegistry, SharedNotifier};
