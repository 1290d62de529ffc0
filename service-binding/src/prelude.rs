// Logging macros for the cache and loader modules.
// `debug!`, `info!` and `warn!` go to `tracing`, `log` or nowhere depending on
// enabled features.

pub(crate) use crate::observability::{log_debug as debug, log_info as info, log_warn as warn};
