//! Shared test doubles for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use service_binding::watcher_cache::{
    Filesystem, FilesystemId, FilesystemProvider, MetricsErrorKind, MetricsRecorder, Notifier,
    WatchError, WatchEventKind, WatchKey,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Watch keys and notifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MockKey {
    events: Mutex<Vec<WatchEventKind>>,
    invalid: AtomicBool,
    cancelled: AtomicBool,
}

impl MockKey {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct MockKeyHandle(Arc<MockKey>);

impl WatchKey for MockKeyHandle {
    fn is_valid(&self) -> bool {
        !self.0.invalid.load(Ordering::SeqCst) && !self.0.is_cancelled()
    }

    fn poll_events(&mut self) -> Vec<WatchEventKind> {
        std::mem::take(&mut *self.0.events.lock().unwrap())
    }

    fn reset(&mut self) -> bool {
        self.is_valid()
    }

    fn cancel(&mut self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct MockNotifier {
    closed: AtomicBool,
    closes: AtomicUsize,
    registrations: AtomicUsize,
    keys: Mutex<HashMap<PathBuf, Vec<Arc<MockKey>>>>,
}

impl MockNotifier {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Keys for `directory` that have not been cancelled.
    pub fn live_keys(&self, directory: &Path) -> Vec<Arc<MockKey>> {
        self.keys
            .lock()
            .unwrap()
            .get(directory)
            .map(|keys| keys.iter().filter(|k| !k.is_cancelled()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_keys(&self, directory: &Path) -> Vec<Arc<MockKey>> {
        self.keys
            .lock()
            .unwrap()
            .get(directory)
            .cloned()
            .unwrap_or_default()
    }
}

struct MockNotifierHandle(Arc<MockNotifier>);

impl Notifier for MockNotifierHandle {
    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn register(&self, directory: &Path) -> Result<Box<dyn WatchKey>, WatchError> {
        if self.0.is_closed() {
            return Err(WatchError::NotifierClosed);
        }
        self.0.registrations.fetch_add(1, Ordering::SeqCst);
        let key = Arc::new(MockKey::default());
        self.0
            .keys
            .lock()
            .unwrap()
            .entry(directory.to_path_buf())
            .or_default()
            .push(Arc::clone(&key));
        Ok(Box::new(MockKeyHandle(key)))
    }

    fn close(&self) -> Result<(), WatchError> {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filesystem and provider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockFilesystem {
    id: FilesystemId,
    usable: AtomicBool,
    notifiers: Mutex<Vec<Arc<MockNotifier>>>,
}

impl MockFilesystem {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: FilesystemId::new(id),
            usable: AtomicBool::new(true),
            notifiers: Mutex::new(Vec::new()),
        })
    }

    pub fn set_usable(&self, usable: bool) {
        self.usable.store(usable, Ordering::SeqCst);
    }

    pub fn notifiers(&self) -> Vec<Arc<MockNotifier>> {
        self.notifiers.lock().unwrap().clone()
    }

    /// The most recently created notifier.
    pub fn notifier(&self) -> Arc<MockNotifier> {
        self.notifiers()
            .last()
            .cloned()
            .expect("no notifier created")
    }

    /// Delivers `kind` to every live key watching `directory`.
    pub fn emit(&self, directory: impl AsRef<Path>, kind: WatchEventKind) {
        for notifier in self.notifiers() {
            for key in notifier.live_keys(directory.as_ref()) {
                key.events.lock().unwrap().push(kind);
            }
        }
    }

    /// Marks every live key watching `directory` as invalid.
    pub fn invalidate(&self, directory: impl AsRef<Path>) {
        for notifier in self.notifiers() {
            for key in notifier.live_keys(directory.as_ref()) {
                key.invalid.store(true, Ordering::SeqCst);
            }
        }
    }
}

impl Filesystem for MockFilesystem {
    fn id(&self) -> FilesystemId {
        self.id.clone()
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    fn new_notifier(&self) -> Result<Box<dyn Notifier>, WatchError> {
        let notifier = Arc::new(MockNotifier::default());
        self.notifiers.lock().unwrap().push(Arc::clone(&notifier));
        Ok(Box::new(MockNotifierHandle(notifier)))
    }
}

#[derive(Debug)]
pub struct MockProvider {
    filesystem: Arc<MockFilesystem>,
    failing: AtomicBool,
    supplies: AtomicUsize,
}

impl MockProvider {
    pub fn new(filesystem: &Arc<MockFilesystem>) -> Arc<Self> {
        Arc::new(Self {
            filesystem: Arc::clone(filesystem),
            failing: AtomicBool::new(false),
            supplies: AtomicUsize::new(0),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        let provider = Self::new(&MockFilesystem::new("unavailable"));
        provider.set_failing(true);
        provider
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn supplies(&self) -> usize {
        self.supplies.load(Ordering::SeqCst)
    }
}

impl FilesystemProvider for MockProvider {
    fn supply(&self) -> Result<Arc<dyn Filesystem>, WatchError> {
        self.supplies.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::FilesystemUnavailable);
        }
        Ok(Arc::clone(&self.filesystem) as Arc<dyn Filesystem>)
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// A record tagged with the directory it came from and the loader call that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub directory: PathBuf,
    pub version: usize,
}

/// Loader that counts calls per directory and returns a new version each time.
#[derive(Debug, Default)]
pub struct CountingLoader {
    calls: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self, directory: impl AsRef<Path>) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(directory.as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// A `DirectoryLoader` closure backed by this counter.
    pub fn loader(
        self: &Arc<Self>,
    ) -> impl Fn(&Path) -> Result<Option<Record>, String> + Send + Sync + 'static {
        let this = Arc::clone(self);
        move |directory: &Path| {
            let mut calls = this.calls.lock().unwrap();
            let version = calls.entry(directory.to_path_buf()).or_insert(0);
            *version += 1;
            Ok(Some(Record {
                directory: directory.to_path_buf(),
                version: *version,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TestMetricsRecorder {
    cache_hits: AtomicUsize,
    loads: AtomicUsize,
    reconciles: AtomicUsize,
    errors: Mutex<HashMap<MetricsErrorKind, usize>>,
}

impl TestMetricsRecorder {
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn reconciles(&self) -> usize {
        self.reconciles.load(Ordering::SeqCst)
    }

    pub fn errors(&self, kind: MetricsErrorKind) -> usize {
        self.errors.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }
}

impl MetricsRecorder for TestMetricsRecorder {
    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }

    fn record_reconcile(&self) {
        self.reconciles.fetch_add(1, Ordering::SeqCst);
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        *self.errors.lock().unwrap().entry(kind).or_insert(0) += 1;
    }
}
