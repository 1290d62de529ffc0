//! Error types for reading service bindings from the filesystem.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading a single binding directory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// A file inside the binding directory exists but could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Errors produced while parsing a `.metadata` document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MetadataError {
    /// The document is not valid JSON.
    #[error("invalid metadata json: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is valid JSON but not an object.
    #[error("metadata must be a json object")]
    NotAnObject,
}

/// Errors produced by a [`ServiceBindingAccessor`](crate::ServiceBindingAccessor).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceBindingAccessError {
    /// A binding directory could not be loaded.
    #[error("failed to load service binding")]
    Load(#[from] LoadError),
}
