use super::errors::WatchError;
use super::fs::WatchKey;
use super::registry::SharedNotifier;
use crate::prelude::debug;
use std::fmt;
use std::path::{Path, PathBuf};

/// A directory's registration against a shared notifier.
pub(super) struct Subscription {
    directory: PathBuf,
    key: Box<dyn WatchKey>,
}

impl Subscription {
    /// Registers `directory` for create, modify and delete events.
    ///
    /// Fails if the notifier is closed or the registration itself fails; the caller is
    /// expected to load the directory directly in that case.
    pub(super) fn subscribe(
        notifier: &SharedNotifier,
        directory: &Path,
    ) -> Result<Self, WatchError> {
        let key = notifier.register(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            key,
        })
    }

    pub(super) fn is_valid(&self) -> bool {
        self.key.is_valid()
    }

    /// Drains pending events and reports whether any of them was a modification.
    ///
    /// Events are consumed: call this once per decision.
    pub(super) fn has_changed(&mut self) -> bool {
        let events = self.key.poll_events();
        self.key.reset();

        let changed = events.iter().any(|kind| kind.is_modification());
        if changed {
            debug!(
                "Detected change: directory={}, events={}",
                self.directory.display(),
                events.len()
            );
        }
        changed
    }

    pub(super) fn cancel(mut self) {
        self.key.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("directory", &self.directory)
            .field("key", &"<WatchKey>")
            .finish()
    }
}
