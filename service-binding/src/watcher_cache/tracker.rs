/// Identical reconciliation failures in a row that are still logged at WARN.
pub(crate) const MAX_CONSECUTIVE_SAME_ERROR: u32 = 3;

/// Categories of reconciliation failures, used to group log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ErrorKey {
    /// The filesystem provider failed.
    FilesystemSupply,
    /// The supplied filesystem was not usable.
    FilesystemUnusable,
    /// No notifier could be acquired.
    NotifierAcquire,
}

/// Throttles log output for a failure that keeps repeating.
///
/// The first `max_consecutive` occurrences of a failure are reported as warnings.
/// Further repeats are logged at debug level until a different failure occurs or the
/// tracker is reset.
#[derive(Debug)]
pub(crate) struct ErrorTracker {
    streak: Option<(ErrorKey, u32)>,
    max_consecutive: u32,
}

impl ErrorTracker {
    pub(crate) const fn new(max_consecutive: u32) -> Self {
        Self {
            streak: None,
            max_consecutive,
        }
    }

    /// Records a failure and returns `true` if it should be logged at WARN.
    pub(crate) fn record_error(&mut self, key: ErrorKey) -> bool {
        let count = match self.streak {
            Some((last, count)) if last == key => count.saturating_add(1),
            _ => 1,
        };
        self.streak = Some((key, count));
        count <= self.max_consecutive
    }

    pub(crate) fn reset(&mut self) {
        self.streak = None;
    }

    /// Length of the current run of identical failures.
    pub(crate) fn consecutive_count(&self) -> u32 {
        self.streak.map_or(0, |(_, count)| count)
    }
}
