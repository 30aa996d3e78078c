//! The synchronization engine and its utilities.
//!
//! - [`formats`]: extension/MIME registry and icon hinting
//! - [`basename`]: unique base-name allocation
//! - [`codec`]: key-value blob, sidecar and manifest codecs
//! - [`scanner`]: grouping directory contents into base-name buckets
//! - [`materialize`]: items to files and back, with hash-elided writes
//! - [`watcher`]: the debounced per-tab reconciliation engine
//! - [`loader`]: the façade binding tabs to paths and owning watchers

pub mod basename;
pub mod codec;
pub mod error;
pub mod formats;
pub mod loader;
pub mod materialize;
pub mod scanner;
pub mod watcher;

pub use codec::{Manifest, MANIFEST_HEADER, MANIFEST_VERSION};
pub use error::SyncError;
pub use formats::{FileFormat, FileMatch, IconHint, SIDECAR_SUFFIX};
pub use loader::{SyncLoader, SyncSettings};
pub use scanner::{BaseNameBucket, ExtMatch};
pub use watcher::{FileWatcher, SyncDirection, SyncUpdate, DEFAULT_DEBOUNCE_MS};
