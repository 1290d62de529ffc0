//! In-memory filesystem doubles for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::errors::WatchError;
use super::fs::{Filesystem, FilesystemId, FilesystemProvider, Notifier, WatchEventKind, WatchKey};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct KeyState {
    events: Mutex<Vec<WatchEventKind>>,
    valid: AtomicBool,
    cancelled: AtomicBool,
}

impl KeyState {
    pub(crate) fn push(&self, kind: WatchEventKind) {
        self.events.lock().unwrap().push(kind);
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct TestKey(Arc<KeyState>);

impl WatchKey for TestKey {
    fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::SeqCst) && !self.0.is_cancelled()
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

#[derive(Default)]
pub(crate) struct NotifierState {
    closed: AtomicBool,
    closes: AtomicUsize,
    keys: Mutex<HashMap<PathBuf, Vec<Arc<KeyState>>>>,
}

impl NotifierState {
    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct TestNotifier {
    state: Arc<NotifierState>,
    unwatchable: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Notifier for TestNotifier {
    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
    fn register(&self, directory: &Path) -> Result<Box<dyn WatchKey>, WatchError> {
        if self.is_closed() {
            return Err(WatchError::NotifierClosed);
        }
        if self.unwatchable.lock().unwrap().contains(directory) {
            return Err(WatchError::Register {
                path: directory.to_path_buf(),
                source: std::io::Error::other("watch limit reached"),
            });
        }
        let state = Arc::new(KeyState::default());
        state.valid.store(true, Ordering::SeqCst);
        self.state
            .keys
            .lock()
            .unwrap()
            .entry(directory.to_path_buf())
            .or_default()
            .push(Arc::clone(&state));
        Ok(Box::new(TestKey(state)))
    }
    fn close(&self) -> Result<(), WatchError> {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct TestFilesystem {
    id: FilesystemId,
    usable: AtomicBool,
    notifiers: Mutex<Vec<Arc<NotifierState>>>,
    unwatchable: Arc<Mutex<HashSet<PathBuf>>>,
}

impl TestFilesystem {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: FilesystemId::new(id),
            usable: AtomicBool::new(true),
            notifiers: Mutex::new(Vec::new()),
            unwatchable: Arc::default(),
        })
    }

    pub(crate) fn set_usable(&self, usable: bool) {
        self.usable.store(usable, Ordering::SeqCst);
    }

    pub(crate) fn fail_register(&self, directory: &Path) {
        self.unwatchable
            .lock()
            .unwrap()
            .insert(directory.to_path_buf());
    }

    pub(crate) fn notifiers(&self) -> Vec<Arc<NotifierState>> {
        self.notifiers.lock().unwrap().clone()
    }

    pub(crate) fn close_notifiers(&self) {
        for n in self.notifiers() {
            n.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Live (uncancelled) keys registered for `directory` across all notifiers.
    pub(crate) fn keys(&self, directory: &Path) -> Vec<Arc<KeyState>> {
        self.notifiers()
            .iter()
            .flat_map(|n| {
                n.keys
                    .lock()
                    .unwrap()
                    .get(directory)
                    .cloned()
                    .unwrap_or_default()
            })
            .filter(|k| !k.is_cancelled())
            .collect()
    }

    pub(crate) fn emit(&self, directory: &Path, kind: WatchEventKind) {
        for key in self.keys(directory) {
            key.push(kind);
        }
    }
}

impl Filesystem for TestFilesystem {
    fn id(&self) -> FilesystemId {
        self.id.clone()
    }
    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }
    fn new_notifier(&self) -> Result<Box<dyn Notifier>, WatchError> {
        let state = Arc::new(NotifierState::default());
        self.notifiers.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(TestNotifier {
            state,
            unwatchable: Arc::clone(&self.unwatchable),
        }))
    }
}

pub(crate) struct TestProvider {
    filesystem: Option<Arc<TestFilesystem>>,
    supplies: AtomicUsize,
    fail_next: AtomicUsize,
}

impl TestProvider {
    pub(crate) fn healthy(filesystem: Arc<TestFilesystem>) -> Arc<Self> {
        Arc::new(Self {
            filesystem: Some(filesystem),
            supplies: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            filesystem: None,
            supplies: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn supplies(&self) -> usize {
        self.supplies.load(Ordering::SeqCst)
    }
}

impl FilesystemProvider for TestProvider {
    fn supply(&self) -> Result<Arc<dyn Filesystem>, WatchError> {
        self.supplies.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(WatchError::FilesystemUnavailable);
        }
        match &self.filesystem {
            Some(fs) => Ok(Arc::clone(fs) as Arc<dyn Filesystem>),
            None => Err(WatchError::FilesystemUnavailable),
        }
    }
}
