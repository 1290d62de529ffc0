use super::cache::WatcherCache;
use super::fs::FilesystemProvider;
use super::loader::DirectoryLoader;
use super::metrics::MetricsRecorder;
use super::reconcile::Reconciler;
use super::registry::NotifierRegistry;
use std::fmt;
use std::sync::Arc;

/// Default number of counted reconciliation attempts before a cache stops retrying.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Builder for [`WatcherCache`].
///
/// # Example
///
/// ```no_run
/// use service_binding::watcher_cache::{NotifierRegistry, WatcherCache};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let loader = |dir: &Path| -> Result<Option<String>, std::io::Error> {
///     Ok(Some(dir.display().to_string()))
/// };
/// let cache = WatcherCache::builder(loader)
///     .max_attempts(5)
///     .registry(Arc::new(NotifierRegistry::new()))
///     .build();
/// ```
pub struct WatcherCacheBuilder<L> {
    loader: L,
    provider: Option<Arc<dyn FilesystemProvider>>,
    registry: Option<Arc<NotifierRegistry>>,
    max_attempts: u32,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl<L> fmt::Debug for WatcherCacheBuilder<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherCacheBuilder")
            .field("loader", &"<DirectoryLoader>")
            .field(
                "provider",
                &self.provider.as_ref().map(|_| "<FilesystemProvider>"),
            )
            .field("registry", &self.registry)
            .field("max_attempts", &self.max_attempts)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish()
    }
}

impl<L: DirectoryLoader> WatcherCacheBuilder<L> {
    /// Creates a builder for a cache backed by `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            provider: None,
            registry: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            metrics: None,
        }
    }

    /// Sets the source of filesystem handles.
    ///
    /// Defaults to the native `notify` backend when the `watcher` feature is enabled.
    /// Without it, the default provider never supplies a filesystem and the cache always
    /// loads directly.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn FilesystemProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the registry notifiers are shared through.
    ///
    /// Defaults to [`NotifierRegistry::global`]. Caches only share notifiers with caches
    /// using the same registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<NotifierRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the attempt budget. Default is [`DEFAULT_MAX_ATTEMPTS`].
    ///
    /// The initial setup is free; every later attempt to re-establish a broken watch
    /// costs one unit, and every call served by a healthy watch gives one unit back.
    /// With the budget spent, the cache stays degraded and loads directly.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets an optional metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the cache. No filesystem resources are acquired until the first call.
    pub fn build(self) -> WatcherCache<L> {
        let provider = self.provider.unwrap_or_else(default_provider);
        let registry = self.registry.unwrap_or_else(NotifierRegistry::global);
        let reconciler = Reconciler::new(
            provider,
            registry,
            self.max_attempts,
            self.metrics.clone(),
        );
        WatcherCache::from_parts(self.loader, reconciler, self.metrics)
    }
}

#[cfg(feature = "watcher")]
fn default_provider() -> Arc<dyn FilesystemProvider> {
    Arc::new(super::native::NativeFilesystemProvider::new())
}

#[cfg(not(feature = "watcher"))]
fn default_provider() -> Arc<dyn FilesystemProvider> {
    use super::errors::WatchError;
    use super::fs::Filesystem;

    fn unavailable() -> Result<Arc<dyn Filesystem>, WatchError> {
        Err(WatchError::FilesystemUnavailable)
    }
    Arc::new(unavailable)
}
