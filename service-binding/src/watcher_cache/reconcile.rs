use super::errors::MetricsErrorKind;
use super::fs::{Filesystem, FilesystemProvider};
use super::metrics::MetricsRecorder;
use super::registry::{NotifierRegistry, SharedNotifier};
use super::tracker::{ErrorKey, ErrorTracker, MAX_CONSECUTIVE_SAME_ERROR};
use crate::prelude::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Watch state of a [`WatcherCache`](super::WatcherCache).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    /// No filesystem handle is held (never set up, or resources were released).
    Unestablished,
    /// A usable filesystem handle and an open notifier are held; directories are cached.
    Ready,
    /// The filesystem or notifier is unusable; every call loads directories directly.
    Degraded,
}

/// Owns a cache's filesystem and notifier handles and decides, once per call, whether
/// they have to be re-established.
///
/// Every reconciliation attempt after the initial setup consumes one unit of the
/// attempt budget; every call that finds the handles healthy gives one unit back.
pub(super) struct Reconciler {
    provider: Arc<dyn FilesystemProvider>,
    registry: Arc<NotifierRegistry>,
    metrics: Option<Arc<dyn MetricsRecorder>>,

    filesystem: Option<Arc<dyn Filesystem>>,
    notifier: Option<Arc<SharedNotifier>>,
    state: WatchState,

    attempted: bool,
    attempts_used: u32,
    max_attempts: u32,
    error_tracker: ErrorTracker,
}

impl Reconciler {
    pub(super) fn new(
        provider: Arc<dyn FilesystemProvider>,
        registry: Arc<NotifierRegistry>,
        max_attempts: u32,
        metrics: Option<Arc<dyn MetricsRecorder>>,
    ) -> Self {
        Self {
            provider,
            registry,
            metrics,
            filesystem: None,
            notifier: None,
            state: WatchState::Unestablished,
            attempted: false,
            attempts_used: 0,
            max_attempts,
            error_tracker: ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR),
        }
    }

    pub(super) fn state(&self) -> WatchState {
        self.state
    }

    pub(super) fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub(super) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs the per-call check and returns the notifier to use, or `None` if the
    /// caller must fall back to direct loads.
    pub(super) fn ensure_ready(&mut self) -> Option<Arc<SharedNotifier>> {
        if let Some(notifier) = self.healthy_notifier() {
            self.attempts_used = self.attempts_used.saturating_sub(1);
            self.state = WatchState::Ready;
            return Some(notifier);
        }

        // The lazy initial setup is free; every later attempt counts.
        if self.attempted {
            if self.attempts_used >= self.max_attempts {
                debug!(
                    "Skipping reconciliation: attempts_used={}, max_attempts={}",
                    self.attempts_used, self.max_attempts
                );
                self.record_error(MetricsErrorKind::AttemptsExhausted);
                self.release();
                self.state = WatchState::Degraded;
                return None;
            }
            self.attempts_used += 1;
        }
        self.attempted = true;

        self.reconcile()
    }

    /// Releases the notifier reference and drops the filesystem handle. Idempotent.
    pub(super) fn release(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            self.registry.release(&notifier);
        }
        self.filesystem = None;
        if self.state == WatchState::Ready {
            self.state = WatchState::Unestablished;
        }
    }

    fn healthy_notifier(&self) -> Option<Arc<SharedNotifier>> {
        let filesystem = self.filesystem.as_ref()?;
        let notifier = self.notifier.as_ref()?;
        if !filesystem.is_usable() || notifier.is_closed() {
            return None;
        }
        Some(Arc::clone(notifier))
    }

    fn reconcile(&mut self) -> Option<Arc<SharedNotifier>> {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_reconcile();
        }

        let filesystem = match self.provider.supply() {
            Ok(fs) if fs.is_usable() => fs,
            Ok(_) => {
                self.report(
                    ErrorKey::FilesystemUnusable,
                    format_args!("Supplied filesystem is not usable; loading directly"),
                );
                return self.degrade(MetricsErrorKind::FilesystemUnavailable);
            }
            Err(e) => {
                self.report(
                    ErrorKey::FilesystemSupply,
                    format_args!("Failed to supply filesystem; loading directly: error={e}"),
                );
                return self.degrade(MetricsErrorKind::FilesystemUnavailable);
            }
        };

        // Acquire before releasing so a notifier shared with the previous handle stays open.
        let previous = self.notifier.take();
        let acquired = self.registry.acquire(&filesystem);
        if let Some(previous) = previous {
            self.registry.release(&previous);
        }
        self.filesystem = Some(filesystem);

        match acquired {
            Some(notifier) if !notifier.is_closed() => {
                if self.error_tracker.consecutive_count() > 0 {
                    info!(
                        "Filesystem watch recovered after {} consecutive failures",
                        self.error_tracker.consecutive_count()
                    );
                }
                self.error_tracker.reset();
                debug!(
                    "Filesystem watch established: filesystem={}, attempts_used={}",
                    notifier.filesystem_id(),
                    self.attempts_used
                );
                self.notifier = Some(Arc::clone(&notifier));
                self.state = WatchState::Ready;
                Some(notifier)
            }
            Some(notifier) => {
                self.registry.release(&notifier);
                self.report(
                    ErrorKey::NotifierAcquire,
                    format_args!("Acquired notifier is already closed; loading directly"),
                );
                self.degrade(MetricsErrorKind::NotifierUnavailable)
            }
            None => {
                self.report(
                    ErrorKey::NotifierAcquire,
                    format_args!("No notifier available; loading directly"),
                );
                self.degrade(MetricsErrorKind::NotifierUnavailable)
            }
        }
    }

    fn degrade(&mut self, kind: MetricsErrorKind) -> Option<Arc<SharedNotifier>> {
        self.record_error(kind);
        self.release();
        self.state = WatchState::Degraded;
        None
    }

    fn report(&mut self, key: ErrorKey, message: fmt::Arguments<'_>) {
        if self.error_tracker.record_error(key) {
            warn!("{}", message);
        } else {
            debug!(
                "{} (repeated): consecutive_failures={}",
                message,
                self.error_tracker.consecutive_count()
            );
        }
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_error(kind);
        }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("provider", &"<FilesystemProvider>")
            .field("registry", &self.registry)
            .field("filesystem", &self.filesystem.as_ref().map(|fs| fs.id()))
            .field("notifier", &self.notifier)
            .field("state", &self.state)
            .field("attempted", &self.attempted)
            .field("attempts_used", &self.attempts_used)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
