//! Crate-internal logging macros.
//!
//! Every macro forwards to `emit!`, which picks the backend:
//! `tracing` when that feature is on, otherwise `log` under `logging`,
//! otherwise nothing (arguments are still type-checked).

macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { ::tracing::$level!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { ::log::$level!($($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

/// Per-directory detail: loads, cache hits, skipped properties.
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::observability::emit!(debug, $($arg)*) };
}

/// Watch lifecycle: a notifier created or closed, a reconciliation succeeding.
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::observability::emit!(info, $($arg)*) };
}

/// Degraded operation. Repeats are throttled by the callers.
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::observability::emit!(warn, $($arg)*) };
}

pub(crate) use emit;
pub(crate) use log_debug;
pub(crate) use log_info;
pub(crate) use log_warn;
