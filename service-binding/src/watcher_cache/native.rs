//! `notify`-backed implementation of the filesystem collaborators.

use super::errors::WatchError;
use super::fs::{
    Filesystem, FilesystemId, FilesystemProvider, Notifier, WatchEventKind, WatchKey,
};
use crate::prelude::{debug, warn};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identity shared by every handle to the local filesystem.
pub const NATIVE_FILESYSTEM_ID: &str = "native";

/// Supplies handles to the local filesystem.
#[derive(Debug, Default)]
pub struct NativeFilesystemProvider {
    filesystem: Arc<NativeFilesystem>,
}

impl NativeFilesystemProvider {
    /// Creates a new provider.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilesystemProvider for NativeFilesystemProvider {
    fn supply(&self) -> Result<Arc<dyn Filesystem>, WatchError> {
        Ok(Arc::clone(&self.filesystem) as Arc<dyn Filesystem>)
    }
}

/// The local filesystem. Always usable; notifiers are `notify::RecommendedWatcher`s.
#[derive(Debug)]
pub struct NativeFilesystem {
    id: FilesystemId,
}

impl Default for NativeFilesystem {
    fn default() -> Self {
        Self {
            id: FilesystemId::new(NATIVE_FILESYSTEM_ID),
        }
    }
}

impl Filesystem for NativeFilesystem {
    fn id(&self) -> FilesystemId {
        self.id.clone()
    }

    fn is_usable(&self) -> bool {
        true
    }

    fn new_notifier(&self) -> Result<Box<dyn Notifier>, WatchError> {
        Ok(Box::new(NativeNotifier::new()?))
    }
}

type Routes = HashMap<PathBuf, Vec<Arc<KeyState>>>;

#[derive(Debug)]
struct KeyState {
    // Deduplicated: only the presence of a kind matters to the cache.
    events: Mutex<Vec<WatchEventKind>>,
    valid: AtomicBool,
}

impl KeyState {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            valid: AtomicBool::new(true),
        }
    }

    fn push(&self, kind: WatchEventKind) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if !events.contains(&kind) {
            events.push(kind);
        }
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

struct Inner {
    watcher: Mutex<Option<RecommendedWatcher>>,
    routes: Arc<Mutex<Routes>>,
    closed: AtomicBool,
}

impl Inner {
    fn lock_watcher(&self) -> MutexGuard<'_, Option<RecommendedWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_routes(&self) -> MutexGuard<'_, Routes> {
        lock_routes(&self.routes)
    }

    /// Removes one key; the OS watch goes away with the last key for its path.
    fn remove_key(&self, path: &Path, key: &Arc<KeyState>) {
        // The watcher lock serializes watch/unwatch with registration. The routes lock
        // is never held across a call into the watcher: its event thread takes it too.
        let mut watcher = self.lock_watcher();

        let last = {
            let mut routes = self.lock_routes();
            let Some(keys) = routes.get_mut(path) else {
                return;
            };
            keys.retain(|k| !Arc::ptr_eq(k, key));
            let last = keys.is_empty();
            if last {
                routes.remove(path);
            }
            last
        };

        if last {
            if let Some(watcher) = watcher.as_mut() {
                if let Err(e) = watcher.unwatch(path) {
                    debug!("Failed to unwatch {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// One `RecommendedWatcher` shared by every key registered through it.
struct NativeNotifier {
    inner: Arc<Inner>,
}

impl NativeNotifier {
    fn new() -> Result<Self, WatchError> {
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let handler_routes = Arc::clone(&routes);

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let routes = lock_routes(&handler_routes);
                match res {
                    Ok(event) => dispatch(&routes, &event),
                    Err(e) => {
                        warn!("File watcher error, invalidating all watches: {}", e);
                        routes.values().flatten().for_each(|k| k.invalidate());
                    }
                }
            },
            Config::default(),
        )
        .map_err(creation_failed)?;

        Ok(Self {
            inner: Arc::new(Inner {
                watcher: Mutex::new(Some(watcher)),
                routes,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl Notifier for NativeNotifier {
    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn register(&self, directory: &Path) -> Result<Box<dyn WatchKey>, WatchError> {
        let path = std::fs::canonicalize(directory).map_err(|source| WatchError::Register {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut watcher = self.inner.lock_watcher();
        let Some(active) = watcher.as_mut() else {
            return Err(WatchError::NotifierClosed);
        };

        let key = Arc::new(KeyState::new());
        let first = {
            let mut routes = self.inner.lock_routes();
            let keys = routes.entry(path.clone()).or_default();
            keys.push(Arc::clone(&key));
            keys.len() == 1
        };

        if first {
            if let Err(e) = active.watch(&path, RecursiveMode::NonRecursive) {
                self.inner.lock_routes().remove(&path);
                return Err(e.into());
            }
            debug!("Watching directory {}", path.display());
        }

        Ok(Box::new(NativeWatchKey {
            inner: Arc::clone(&self.inner),
            path,
            state: key,
            cancelled: false,
        }))
    }

    fn close(&self) -> Result<(), WatchError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the watcher stops its event thread.
        drop(self.inner.lock_watcher().take());

        let mut routes = self.inner.lock_routes();
        routes.values().flatten().for_each(|k| k.invalidate());
        routes.clear();
        Ok(())
    }
}

struct NativeWatchKey {
    inner: Arc<Inner>,
    path: PathBuf,
    state: Arc<KeyState>,
    cancelled: bool,
}

impl WatchKey for NativeWatchKey {
    fn is_valid(&self) -> bool {
        !self.cancelled
            && self.state.valid.load(Ordering::Acquire)
            && !self.inner.closed.load(Ordering::Acquire)
    }

    fn poll_events(&mut self) -> Vec<WatchEventKind> {
        std::mem::take(
            &mut *self
                .state
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn reset(&mut self) -> bool {
        self.is_valid()
    }

    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.state.invalidate();
        self.inner.remove_key(&self.path, &self.state);
    }
}

impl Drop for NativeWatchKey {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for NativeWatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeWatchKey")
            .field("path", &self.path)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

// Backend failures while building a watcher (e.g. inotify instance limits).
fn creation_failed(error: notify::Error) -> WatchError {
    let source = match error.kind {
        notify::ErrorKind::Io(e) => e,
        other => io::Error::other(notify::Error::new(other)),
    };
    WatchError::CreateNotifier(source)
}

fn lock_routes(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Remove(_) => Some(WatchEventKind::Deleted),
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => Some(WatchEventKind::Other),
    }
}

fn dispatch(routes: &Routes, event: &Event) {
    if event.need_rescan() {
        // Events were dropped; assume everything changed.
        routes
            .values()
            .flatten()
            .for_each(|k| k.push(WatchEventKind::Modified));
        return;
    }

    let Some(kind) = classify(&event.kind) else {
        return;
    };

    for path in &event.paths {
        if let Some(keys) = routes.get(path) {
            for key in keys {
                key.push(kind);
                if kind == WatchEventKind::Deleted {
                    key.invalidate();
                }
            }
        }
        if let Some(keys) = path.parent().and_then(|parent| routes.get(parent)) {
            keys.iter().for_each(|k| k.push(kind));
        }
    }
}
