//! Filesystem and notifier abstractions consumed by [`WatcherCache`](super::WatcherCache).
//!
//! The cache never talks to the OS directly. A [`FilesystemProvider`] supplies a
//! [`Filesystem`] handle, the filesystem creates [`Notifier`]s, and notifiers hand out
//! per-directory [`WatchKey`]s. The `notify`-backed implementation lives in
//! [`native`](super::native); tests substitute their own.

use super::errors::WatchError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Stable identity of a filesystem instance.
///
/// Notifiers are shared between cache instances per `FilesystemId`: two handles with
/// the same identity observe the same filesystem.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilesystemId(Arc<str>);

impl FilesystemId {
    /// Creates a new identity from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilesystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a change event reported by a [`WatchKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// An entry was created in the watched directory.
    Created,
    /// An entry in the watched directory was modified (content, metadata or name).
    Modified,
    /// An entry was removed from the watched directory.
    Deleted,
    /// Any other event; never treated as a change.
    Other,
}

impl WatchEventKind {
    /// Returns `true` for create, modify and delete events.
    pub const fn is_modification(self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Deleted)
    }
}

/// Supplies fresh [`Filesystem`] handles.
///
/// Called by the cache whenever its current handle is missing or broken.
pub trait FilesystemProvider: Send + Sync {
    /// Returns a filesystem handle, or an error if none is available right now.
    fn supply(&self) -> Result<Arc<dyn Filesystem>, WatchError>;
}

impl<F> FilesystemProvider for F
where
    F: Fn() -> Result<Arc<dyn Filesystem>, WatchError> + Send + Sync,
{
    fn supply(&self) -> Result<Arc<dyn Filesystem>, WatchError> {
        (self)()
    }
}

/// A handle to a filesystem instance.
pub trait Filesystem: Send + Sync {
    /// Stable identity used to share notifiers between caches.
    fn id(&self) -> FilesystemId;

    /// Returns `false` once the handle can no longer be used (e.g. it was closed).
    fn is_usable(&self) -> bool;

    /// Creates a new OS-level notifier for this filesystem.
    fn new_notifier(&self) -> Result<Box<dyn Notifier>, WatchError>;
}

/// An OS-level change notification resource.
///
/// A notifier is shared by every cache observing the same filesystem, so all methods
/// take `&self`.
pub trait Notifier: Send + Sync {
    /// Non-blocking liveness probe: returns `true` once the notifier is unusable.
    fn is_closed(&self) -> bool;

    /// Registers `directory` for create, modify and delete events.
    fn register(&self, directory: &Path) -> Result<Box<dyn WatchKey>, WatchError>;

    /// Closes the underlying OS resource. Further registrations fail.
    fn close(&self) -> Result<(), WatchError>;
}

/// A single directory registration against a [`Notifier`].
pub trait WatchKey: Send {
    /// Returns `false` once the registration was cancelled or invalidated by the OS.
    fn is_valid(&self) -> bool;

    /// Drains and returns all pending events. Never blocks.
    fn poll_events(&mut self) -> Vec<WatchEventKind>;

    /// Re-arms the key after its events were drained. Returns the key's validity.
    fn reset(&mut self) -> bool;

    /// Cancels the registration. Best effort, idempotent.
    fn cancel(&mut self);
}
