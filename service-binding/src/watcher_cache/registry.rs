//! Reference-counted pool of notifiers, one per filesystem identity.

use super::fs::{Filesystem, FilesystemId, Notifier, WatchKey};
use super::errors::WatchError;
use crate::prelude::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static GLOBAL: Lazy<Arc<NotifierRegistry>> = Lazy::new(|| Arc::new(NotifierRegistry::new()));

/// A notifier shared by every cache instance observing the same filesystem.
///
/// Obtained from [`NotifierRegistry::acquire`] and handed back through
/// [`NotifierRegistry::release`]. The underlying notifier is closed exactly once, when
/// the last holder releases it or when the registry prunes it.
pub struct SharedNotifier {
    id: FilesystemId,
    notifier: Box<dyn Notifier>,
    closed: AtomicBool,
}

impl SharedNotifier {
    fn new(id: FilesystemId, notifier: Box<dyn Notifier>) -> Self {
        Self {
            id,
            notifier,
            closed: AtomicBool::new(false),
        }
    }

    /// The identity of the filesystem this notifier observes.
    pub fn filesystem_id(&self) -> &FilesystemId {
        &self.id
    }

    /// Returns `true` if the notifier was closed by the registry or reports itself closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.notifier.is_closed()
    }

    pub(super) fn register(&self, directory: &Path) -> Result<Box<dyn WatchKey>, WatchError> {
        if self.is_closed() {
            return Err(WatchError::NotifierClosed);
        }
        self.notifier.register(directory)
    }

    // Close errors are suppressed: release is best effort.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.notifier.close() {
            warn!("Failed to close notifier: filesystem={}, error={}", self.id, e);
        }
    }
}

impl fmt::Debug for SharedNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedNotifier")
            .field("id", &self.id)
            .field("notifier", &"<Notifier>")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

struct Entry {
    filesystem: Arc<dyn Filesystem>,
    notifier: Arc<SharedNotifier>,
    ref_count: usize,
}

/// Process-wide pool of [`SharedNotifier`]s keyed by [`FilesystemId`].
///
/// Lookup, creation and pruning happen under one mutex, so two callers can never
/// race to create duplicate notifiers for the same filesystem.
pub struct NotifierRegistry {
    entries: Mutex<HashMap<FilesystemId, Entry>>,
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierRegistry {
    /// Creates an empty, isolated registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the process-wide registry used by default.
    pub fn global() -> Arc<NotifierRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Returns the shared notifier for `filesystem`, creating it if needed.
    ///
    /// Returns `None` if the filesystem is not usable or a notifier cannot be created.
    /// On success the notifier's reference count has been incremented; the caller owns
    /// one reference and must hand it back through [`release`](Self::release).
    pub fn acquire(&self, filesystem: &Arc<dyn Filesystem>) -> Option<Arc<SharedNotifier>> {
        let mut entries = self.lock();
        prune(&mut entries);

        if !filesystem.is_usable() {
            debug!("Not acquiring notifier: filesystem is not usable");
            return None;
        }

        let id = filesystem.id();
        if let Some(entry) = entries.get_mut(&id) {
            entry.ref_count += 1;
            return Some(Arc::clone(&entry.notifier));
        }

        let notifier = match filesystem.new_notifier() {
            Ok(n) => Arc::new(SharedNotifier::new(id.clone(), n)),
            Err(e) => {
                warn!("Failed to create notifier: filesystem={}, error={}", id, e);
                return None;
            }
        };
        debug!("Created notifier: filesystem={}", id);

        entries.insert(
            id,
            Entry {
                filesystem: Arc::clone(filesystem),
                notifier: Arc::clone(&notifier),
                ref_count: 1,
            },
        );
        Some(notifier)
    }

    /// Hands back one reference to `notifier`.
    ///
    /// When the last reference is released the notifier is closed and removed. Releasing
    /// a notifier that was already pruned from the registry is a no-op.
    pub fn release(&self, notifier: &Arc<SharedNotifier>) {
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(notifier.filesystem_id()) else {
            return;
        };
        if !Arc::ptr_eq(&entry.notifier, notifier) {
            return;
        }

        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            if let Some(entry) = entries.remove(notifier.filesystem_id()) {
                debug!("Closing notifier: filesystem={}", entry.notifier.id);
                entry.notifier.close();
            }
        }
    }

    /// Number of notifiers currently registered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no notifier is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current reference count of the notifier registered for `id`, if any.
    pub fn ref_count(&self, id: &FilesystemId) -> Option<usize> {
        self.lock().get(id).map(|e| e.ref_count)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FilesystemId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

// Drops entries whose filesystem is no longer usable or whose notifier closed itself.
fn prune(entries: &mut HashMap<FilesystemId, Entry>) {
    entries.retain(|id, entry| {
        let alive = entry.filesystem.is_usable() && !entry.notifier.is_closed();
        if !alive {
            debug!("Pruning notifier: filesystem={}", id);
            entry.notifier.close();
        }
        alive
    });
}
