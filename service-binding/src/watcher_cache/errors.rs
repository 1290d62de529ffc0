use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the filesystem and notifier collaborators of a
/// [`WatcherCache`](super::WatcherCache).
///
/// These errors are never returned from
/// [`WatcherCache::get_bindings`](super::WatcherCache::get_bindings): the cache
/// recovers from them by loading directories directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// No filesystem handle could be supplied, or the supplied handle is not usable.
    #[error("filesystem is not available")]
    FilesystemUnavailable,

    /// The notifier was closed before or during the operation.
    #[error("notifier is closed")]
    NotifierClosed,

    /// Creating a new notifier failed (e.g. OS watch limits were reached).
    #[error("failed to create notifier: {0}")]
    CreateNotifier(#[source] io::Error),

    /// Registering a directory with the notifier failed.
    #[error("failed to watch directory '{}': {source}", path.display())]
    Register {
        /// The directory that could not be watched.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// Failure reported by the `notify` backend.
    #[cfg(feature = "watcher")]
    #[error("notify backend error: {0}")]
    Notify(#[from] notify::Error),
}

/// Error kinds for structured metrics reporting.
///
/// Use these stable, low-cardinality labels when recording metrics.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MetricsErrorKind {
    /// The filesystem provider failed or supplied an unusable filesystem.
    FilesystemUnavailable,
    /// No shared notifier could be acquired for the filesystem.
    NotifierUnavailable,
    /// A directory could not be subscribed and was loaded without caching.
    SubscribeFailed,
    /// A previously valid subscription became invalid.
    SubscriptionInvalidated,
    /// Reconciliation was skipped because the attempt budget is exhausted.
    AttemptsExhausted,
    /// The loader returned an error.
    LoaderFailed,
}

impl MetricsErrorKind {
    /// Returns a string representation of the error kind.
    ///
    /// This is useful for metrics systems that require string labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemUnavailable => "filesystem_unavailable",
            Self::NotifierUnavailable => "notifier_unavailable",
            Self::SubscribeFailed => "subscribe_failed",
            Self::SubscriptionInvalidated => "subscription_invalidated",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::LoaderFailed => "loader_failed",
        }
    }
}

impl fmt::Display for MetricsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
