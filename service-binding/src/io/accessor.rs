use super::loader::ServiceBindingIoLoader;
use crate::binding::ServiceBinding;
use crate::error::ServiceBindingAccessError;
use crate::prelude::{debug, warn};
use crate::watcher_cache::{
    FilesystemProvider, MetricsRecorder, NotifierRegistry, WatcherCache, WatcherCacheBuilder,
};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable pointing at the directory that holds one sub-directory per
/// binding.
pub const SERVICE_BINDING_ROOT: &str = "SERVICE_BINDING_ROOT";

/// Reads environment variables. Returns `None` for unset variables.
pub type EnvReader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Source of [`ServiceBinding`]s.
pub trait ServiceBindingAccessor: Send + Sync {
    /// Returns all currently available bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding could not be read. A missing or empty binding
    /// location is not an error.
    fn service_bindings(&self) -> Result<Vec<Arc<ServiceBinding>>, ServiceBindingAccessError>;
}

/// Reads servicebinding.io bindings with SAP `.metadata` files from the filesystem.
///
/// The expected layout is:
///
/// ```text
/// ${SERVICE_BINDING_ROOT}
/// ├── my-xsuaa
/// │   ├── .metadata
/// │   ├── type
/// │   └── clientid
/// └── my-destination
///     ├── .metadata
///     └── ...
/// ```
///
/// Bindings are cached per directory and reloaded only when the directory changes.
///
/// # Examples
///
/// ```no_run
/// use service_binding::{ServiceBindingAccessor, ServiceBindingIoAccessor};
///
/// let accessor = ServiceBindingIoAccessor::builder()
///     .root("/etc/bindings")
///     .build();
///
/// for binding in accessor.service_bindings()? {
///     println!("{:?} -> {:?}", binding.name(), binding.service_name());
/// }
/// # Ok::<(), service_binding::ServiceBindingAccessError>(())
/// ```
pub struct ServiceBindingIoAccessor {
    root: Option<PathBuf>,
    env_reader: EnvReader,
    cache: WatcherCache<ServiceBindingIoLoader>,
}

impl ServiceBindingIoAccessor {
    /// Creates an accessor that resolves its root from [`SERVICE_BINDING_ROOT`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder.
    pub fn builder() -> ServiceBindingIoAccessorBuilder {
        ServiceBindingIoAccessorBuilder::new()
    }

    /// Drops all cached bindings and releases filesystem watches.
    pub fn release_resources(&self) {
        self.cache.release_resources();
    }

    fn root_directory(&self) -> Option<PathBuf> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => match (self.env_reader)(SERVICE_BINDING_ROOT) {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => {
                    debug!("{} is not set", SERVICE_BINDING_ROOT);
                    return None;
                }
            },
        };

        if !root.is_dir() {
            debug!(
                "Service binding root {} is not a directory",
                root.display()
            );
            return None;
        }
        Some(root)
    }

    // An unlistable root serves nothing, so nothing stays cached or watched either.
    fn read_listing(
        &self,
        root: &Path,
        listing: io::Result<Vec<PathBuf>>,
    ) -> Result<Vec<Arc<ServiceBinding>>, ServiceBindingAccessError> {
        match listing {
            Ok(directories) => Ok(self.cache.get_bindings(&directories)?),
            Err(e) => {
                warn!(
                    "Failed to list service binding root {}: {}",
                    root.display(),
                    e
                );
                self.cache.release_resources();
                Ok(Vec::new())
            }
        }
    }
}

impl Default for ServiceBindingIoAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBindingAccessor for ServiceBindingIoAccessor {
    fn service_bindings(&self) -> Result<Vec<Arc<ServiceBinding>>, ServiceBindingAccessError> {
        let Some(root) = self.root_directory() else {
            self.cache.release_resources();
            return Ok(Vec::new());
        };

        debug!("Reading service bindings from {}", root.display());
        self.read_listing(&root, binding_directories(&root))
    }
}

impl fmt::Debug for ServiceBindingIoAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBindingIoAccessor")
            .field("root", &self.root)
            .field("env_reader", &"<EnvReader>")
            .field("cache", &self.cache)
            .finish()
    }
}

fn binding_directories(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut directories = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            directories.push(path);
        }
    }
    directories.sort();
    Ok(directories)
}

/// Builder for [`ServiceBindingIoAccessor`].
pub struct ServiceBindingIoAccessorBuilder {
    root: Option<PathBuf>,
    env_reader: EnvReader,
    cache: WatcherCacheBuilder<ServiceBindingIoLoader>,
}

impl fmt::Debug for ServiceBindingIoAccessorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBindingIoAccessorBuilder")
            .field("root", &self.root)
            .field("env_reader", &"<EnvReader>")
            .field("cache", &self.cache)
            .finish()
    }
}

impl Default for ServiceBindingIoAccessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBindingIoAccessorBuilder {
    /// Creates a builder that reads the root from the process environment.
    pub fn new() -> Self {
        Self {
            root: None,
            env_reader: Arc::new(|key: &str| std::env::var(key).ok()),
            cache: WatcherCache::builder(ServiceBindingIoLoader::new()),
        }
    }

    /// Uses `root` instead of [`SERVICE_BINDING_ROOT`].
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the function used to read [`SERVICE_BINDING_ROOT`].
    #[must_use]
    pub fn env_reader<F>(mut self, reader: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_reader = Arc::new(reader);
        self
    }

    /// Sets the attempt budget of the underlying cache.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.cache = self.cache.max_attempts(max_attempts);
        self
    }

    /// Sets the filesystem provider of the underlying cache.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn FilesystemProvider>) -> Self {
        self.cache = self.cache.provider(provider);
        self
    }

    /// Sets the notifier registry of the underlying cache.
    #[must_use]
    pub fn registry(mut self, registry: Arc<NotifierRegistry>) -> Self {
        self.cache = self.cache.registry(registry);
        self
    }

    /// Sets a metrics recorder for the underlying cache.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.cache = self.cache.metrics(metrics);
        self
    }

    /// Builds the accessor.
    pub fn build(self) -> ServiceBindingIoAccessor {
        ServiceBindingIoAccessor {
            root: self.root,
            env_reader: self.env_reader,
            cache: self.cache.build(),
        }
    }
}
