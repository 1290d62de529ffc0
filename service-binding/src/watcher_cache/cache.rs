use super::builder::WatcherCacheBuilder;
use super::errors::MetricsErrorKind;
use super::loader::DirectoryLoader;
use super::metrics::MetricsRecorder;
use super::reconcile::{Reconciler, WatchState};
use super::registry::SharedNotifier;
use super::subscription::Subscription;
use crate::prelude::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Watch-driven incremental cache of directory records.
///
/// Each directory is loaded once and then served from memory until its filesystem
/// watch reports a create, modify or delete event. If no watch can be established the
/// cache degrades to calling the loader for every directory on every call; filesystem
/// and notifier failures are never surfaced to the caller, only loader errors are.
///
/// All per-instance state is guarded by one mutex held for the duration of each call.
/// Resources are released by [`release_resources`](Self::release_resources) or on drop.
///
/// # Example
///
/// ```no_run
/// use service_binding::watcher_cache::WatcherCache;
/// use std::path::Path;
///
/// let loader = |dir: &Path| -> Result<Option<String>, std::io::Error> {
///     std::fs::read_to_string(dir.join("type")).map(Some)
/// };
/// let cache = WatcherCache::builder(loader).max_attempts(5).build();
///
/// let records = cache.get_bindings(["/bindings/db", "/bindings/queue"])?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct WatcherCache<L: DirectoryLoader> {
    loader: L,
    state: Mutex<CacheState<L::Record>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

struct CacheState<R> {
    reconciler: Reconciler,
    subscriptions: HashMap<PathBuf, Subscription>,
    entries: HashMap<PathBuf, Arc<R>>,
    // Notifier the current subscriptions were registered against.
    notifier: Option<Arc<SharedNotifier>>,
    release_pending: bool,
}

impl<R> CacheState<R> {
    fn clear(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.cancel();
        }
        self.entries.clear();
        self.notifier = None;
    }

    /// Subscriptions only report events from the notifier they were registered with.
    fn bind(&mut self, notifier: &Arc<SharedNotifier>) {
        let current = self
            .notifier
            .as_ref()
            .is_some_and(|n| Arc::ptr_eq(n, notifier));
        if !current {
            self.clear();
            self.notifier = Some(Arc::clone(notifier));
        }
    }

    fn release(&mut self) {
        self.clear();
        self.reconciler.release();
        self.release_pending = false;
    }

    fn prune(&mut self, requested: &HashSet<&Path>) {
        let stale: Vec<PathBuf> = self
            .subscriptions
            .keys()
            .chain(self.entries.keys())
            .filter(|dir| !requested.contains(dir.as_path()))
            .cloned()
            .collect();

        for dir in stale {
            if let Some(subscription) = self.subscriptions.remove(&dir) {
                debug!("Dropping directory no longer requested: {}", dir.display());
                subscription.cancel();
            }
            self.entries.remove(&dir);
        }
    }
}

/// Result of resolving one directory while the watch is ready.
enum Outcome<R> {
    /// Served from the cache; the loader was not called.
    Cached(Option<Arc<R>>),
    /// Loaded (first time or after a change) and cached.
    Loaded(Option<Arc<R>>),
    /// The directory could not be watched; loaded without caching.
    Uncached(Option<Arc<R>>),
    /// The directory's subscription turned invalid; loaded without caching.
    Invalidated(Option<Arc<R>>),
}

impl<R> Outcome<R> {
    fn into_record(self) -> Option<Arc<R>> {
        match self {
            Self::Cached(r) | Self::Loaded(r) | Self::Uncached(r) | Self::Invalidated(r) => r,
        }
    }
}

/// Point-in-time view of a cache's internal state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheStats {
    /// Current watch state.
    pub state: WatchState,
    /// Reconciliation attempts currently charged against the budget.
    pub attempts_used: u32,
    /// The attempt budget.
    pub max_attempts: u32,
    /// Directories currently holding a cached record, sorted.
    pub cached: Vec<PathBuf>,
    /// Directories currently holding a subscription, sorted.
    pub subscribed: Vec<PathBuf>,
}

impl<L: DirectoryLoader> WatcherCache<L> {
    /// Returns a builder for a cache backed by `loader`.
    pub fn builder(loader: L) -> WatcherCacheBuilder<L> {
        WatcherCacheBuilder::new(loader)
    }

    pub(super) fn from_parts(
        loader: L,
        reconciler: Reconciler,
        metrics: Option<Arc<dyn MetricsRecorder>>,
    ) -> Self {
        Self {
            loader,
            state: Mutex::new(CacheState {
                reconciler,
                subscriptions: HashMap::new(),
                entries: HashMap::new(),
                notifier: None,
                release_pending: false,
            }),
            metrics,
        }
    }

    /// Returns the records of `directories`, in the order supplied.
    ///
    /// Directories for which the loader returns `Ok(None)` are skipped, as are
    /// repeated directories after their first occurrence. Cached directories that are
    /// not part of `directories` are evicted and their watches cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the loader. State already updated for other
    /// directories stays consistent; the failing directory is retried on the next call.
    pub fn get_bindings<I, P>(&self, directories: I) -> Result<Vec<Arc<L::Record>>, L::Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let requested = dedup(directories);

        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(notifier) = state.reconciler.ensure_ready() else {
            state.clear();
            return self.load_all(&requested);
        };
        state.bind(&notifier);

        let wanted: HashSet<&Path> = requested.iter().map(PathBuf::as_path).collect();
        state.prune(&wanted);

        let mut records = Vec::with_capacity(requested.len());
        for dir in &requested {
            match self.resolve(state, &notifier, dir) {
                Ok(outcome) => records.extend(outcome.into_record()),
                Err(e) => {
                    if state.release_pending {
                        state.release();
                    }
                    return Err(e);
                }
            }
        }

        if state.release_pending {
            debug!("Releasing watch resources after an invalidated subscription");
            state.release();
        }
        Ok(records)
    }

    /// Cancels all subscriptions, drops all cached records and hands the notifier back
    /// to the registry.
    ///
    /// Idempotent. The next call to [`get_bindings`](Self::get_bindings) re-establishes
    /// the watch.
    pub fn release_resources(&self) {
        self.lock().release();
    }

    /// Returns a snapshot of the cache's state.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut cached: Vec<PathBuf> = state.entries.keys().cloned().collect();
        let mut subscribed: Vec<PathBuf> = state.subscriptions.keys().cloned().collect();
        cached.sort();
        subscribed.sort();

        CacheStats {
            state: state.reconciler.state(),
            attempts_used: state.reconciler.attempts_used(),
            max_attempts: state.reconciler.max_attempts(),
            cached,
            subscribed,
        }
    }

    fn resolve(
        &self,
        state: &mut CacheState<L::Record>,
        notifier: &SharedNotifier,
        dir: &Path,
    ) -> Result<Outcome<L::Record>, L::Error> {
        let Some(subscription) = state.subscriptions.get_mut(dir) else {
            state.entries.remove(dir);
            return match Subscription::subscribe(notifier, dir) {
                Ok(subscription) => match self.load(dir) {
                    Ok(record) => {
                        if let Some(record) = &record {
                            state.entries.insert(dir.to_path_buf(), Arc::clone(record));
                        }
                        state.subscriptions.insert(dir.to_path_buf(), subscription);
                        Ok(Outcome::Loaded(record))
                    }
                    Err(e) => {
                        subscription.cancel();
                        Err(e)
                    }
                },
                Err(e) => {
                    debug!("Cannot watch directory {}; loading directly: {}", dir.display(), e);
                    self.record_error(MetricsErrorKind::SubscribeFailed);
                    self.load(dir).map(Outcome::Uncached)
                }
            };
        };

        if !subscription.is_valid() {
            warn!("Watch for directory {} became invalid", dir.display());
            self.record_error(MetricsErrorKind::SubscriptionInvalidated);
            if let Some(subscription) = state.subscriptions.remove(dir) {
                subscription.cancel();
            }
            state.entries.remove(dir);
            state.release_pending = true;
            return self.load(dir).map(Outcome::Invalidated);
        }

        if subscription.has_changed() {
            // The stale record goes first, whatever the reload returns.
            state.entries.remove(dir);
            return match self.load(dir) {
                Ok(record) => {
                    if let Some(record) = &record {
                        state.entries.insert(dir.to_path_buf(), Arc::clone(record));
                    }
                    Ok(Outcome::Loaded(record))
                }
                Err(e) => {
                    if let Some(subscription) = state.subscriptions.remove(dir) {
                        subscription.cancel();
                    }
                    Err(e)
                }
            };
        }

        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_cache_hit();
        }
        Ok(Outcome::Cached(state.entries.get(dir).cloned()))
    }

    fn load_all(&self, directories: &[PathBuf]) -> Result<Vec<Arc<L::Record>>, L::Error> {
        let mut records = Vec::with_capacity(directories.len());
        for dir in directories {
            records.extend(self.load(dir)?);
        }
        Ok(records)
    }

    fn load(&self, dir: &Path) -> Result<Option<Arc<L::Record>>, L::Error> {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_load();
        }
        match self.loader.load(dir) {
            Ok(record) => Ok(record.map(Arc::new)),
            Err(e) => {
                debug!("Loader failed: directory={}, error={}", dir.display(), e);
                self.record_error(MetricsErrorKind::LoaderFailed);
                Err(e)
            }
        }
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_error(kind);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<L::Record>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L: DirectoryLoader> Drop for WatcherCache<L> {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .release();
    }
}

impl<L: DirectoryLoader> fmt::Debug for WatcherCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("WatcherCache")
            .field("loader", &"<DirectoryLoader>")
            .field("reconciler", &state.reconciler)
            .field("entries", &state.entries.len())
            .field("subscriptions", &state.subscriptions.len())
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish()
    }
}

fn dedup<I, P>(directories: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen = HashSet::new();
    directories
        .into_iter()
        .map(|d| d.as_ref().to_path_buf())
        .filter(|d| seen.insert(d.clone()))
        .collect()
}
