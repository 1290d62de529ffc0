#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Watch-driven caching of service bindings mounted into a container's filesystem.
//!
//! Kubernetes operators project service credentials into a pod as one directory per
//! binding. This crate reads those directories and keeps the parsed bindings in memory,
//! reloading a binding only when a filesystem watch reports that its directory changed.
//!
//! The primary entry point is [`ServiceBindingIoAccessor`], which discovers binding
//! directories below `SERVICE_BINDING_ROOT` and serves them through a
//! [`WatcherCache`](watcher_cache::WatcherCache).
//!
//! ```no_run
//! use service_binding::{ServiceBindingAccessor, ServiceBindingIoAccessor};
//!
//! let accessor = ServiceBindingIoAccessor::new();
//!
//! // First call loads every binding; later calls only reload changed directories.
//! for binding in accessor.service_bindings()? {
//!     println!("{:?}: {:?}", binding.name(), binding.service_name());
//! }
//! # Ok::<(), service_binding::ServiceBindingAccessError>(())
//! ```
//!
//! The cache itself is independent of the binding format and can be used with any
//! [`DirectoryLoader`](watcher_cache::DirectoryLoader):
//!
//! ```no_run
//! use service_binding::watcher_cache::WatcherCache;
//! use std::path::Path;
//!
//! let cache = WatcherCache::builder(|dir: &Path| -> Result<Option<String>, std::io::Error> {
//!     Ok(Some(std::fs::read_to_string(dir.join("config"))?))
//! })
//! .build();
//! let configs = cache.get_bindings(["/etc/app/a", "/etc/app/b"])?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Features
//!
//! - **`watcher`** (default): native filesystem watches via `notify`. Without it every
//!   cache loads directly on each call.
//! - **`logging`** (default): log through the `log` crate.
//! - **`tracing`**: log through the `tracing` crate instead.

mod observability;
mod prelude;

pub mod binding;
pub mod error;
pub mod io;
pub mod watcher_cache;

// -----------------------
// Re-exports
// -----------------------

pub use crate::binding::{ServiceBinding, ServiceBindingBuilder};
pub use crate::error::{LoadError, MetadataError, ServiceBindingAccessError};
pub use crate::io::{
    ServiceBindingAccessor, ServiceBindingIoAccessor, ServiceBindingIoAccessorBuilder,
    ServiceBindingIoLoader, SERVICE_BINDING_ROOT,
};
pub use crate::watcher_cache::{WatcherCache, WatcherCacheBuilder};
