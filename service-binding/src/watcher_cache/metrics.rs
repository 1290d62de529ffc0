use super::errors::MetricsErrorKind;

/// Trait for recording metrics from a [`WatcherCache`](super::WatcherCache).
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
/// Prefer stable, low-cardinality labels when recording metrics.
///
/// # Example
///
/// ```no_run
/// use service_binding::watcher_cache::{MetricsErrorKind, MetricsRecorder};
///
/// struct MyMetrics;
///
/// impl MetricsRecorder for MyMetrics {
///     fn record_cache_hit(&self) {}
///     fn record_load(&self) {}
///     fn record_reconcile(&self) {}
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("Error: {}", kind.as_str());
///     }
/// }
/// ```
pub trait MetricsRecorder: Send + Sync {
    /// Records that a directory was served from the cache without calling the loader.
    fn record_cache_hit(&self);

    /// Records that the loader was invoked for a directory.
    fn record_load(&self);

    /// Records that the cache attempted to re-establish its filesystem and notifier.
    ///
    /// Recorded once per attempt, including the initial setup.
    fn record_reconcile(&self);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}
