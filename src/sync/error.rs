//! Error types for the synchronization engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while synchronizing a tab with its directory.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The per-tab manifest has an unknown header or version.
    #[error("Manifest header or version mismatch")]
    ManifestMismatch,

    /// The synchronization directory could not be created.
    #[error("Failed to create synchronization directory {path}: {source}")]
    DirectoryCreateFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    FileReadFailed {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file could not be written, copied or renamed.
    #[error("Failed to write {path}: {source}")]
    FileWriteFailed {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The base-name counter hit its ceiling without finding a free name.
    #[error("No unique base name available (counter exhausted)")]
    NameExhausted,

    /// A sidecar file or key-value blob is malformed.
    #[error("Sidecar data is malformed: {0}")]
    SidecarDecodeFailed(String),

    /// The tab model was dropped while a pass was pending.
    #[error("Tab model is gone")]
    ModelGone,

    /// The OS-level filesystem watcher could not be created.
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),
}
