use std::fmt;
use std::path::Path;

/// Produces a record from the contents of one directory.
///
/// The cache calls the loader on a miss, after a detected change, and for every
/// directory while it runs without a filesystem watch. Implementations must be safe to
/// call repeatedly for the same directory.
///
/// Any `Fn(&Path) -> Result<Option<R>, E>` is a loader:
///
/// ```
/// use service_binding::watcher_cache::DirectoryLoader;
/// use std::path::Path;
///
/// let loader = |dir: &Path| -> Result<Option<String>, std::io::Error> {
///     Ok(dir.file_name().map(|n| n.to_string_lossy().into_owned()))
/// };
/// assert_eq!(
///     loader.load(Path::new("/bindings/db")).unwrap().as_deref(),
///     Some("db")
/// );
/// ```
pub trait DirectoryLoader {
    /// The record produced for a directory.
    type Record: Send + Sync;

    /// Failure reported by the loader. Propagated unchanged to callers of the cache.
    type Error: fmt::Display;

    /// Loads `directory`. `Ok(None)` means the directory holds no record; it is skipped.
    fn load(&self, directory: &Path) -> Result<Option<Self::Record>, Self::Error>;
}

impl<F, R, E> DirectoryLoader for F
where
    F: Fn(&Path) -> Result<Option<R>, E>,
    R: Send + Sync,
    E: fmt::Display,
{
    type Record = R;
    type Error = E;

    fn load(&self, directory: &Path) -> Result<Option<R>, E> {
        (self)(directory)
    }
}
