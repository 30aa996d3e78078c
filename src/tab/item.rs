//! Clipboard-like items and their synchronization metadata.
//!
//! An item is a map from MIME type to payload bytes. The bookkeeping the
//! synchronizer needs (base name on disk, extension map, no-save hashes,
//! cross-tab source path) lives in a typed [`SyncMeta`] record instead of
//! reserved keys inside the payload map, so internal state can never leak
//! into a file and user data never collides with it.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Synchronization metadata attached to an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMeta {
    /// Shared file stem identifying this item on disk, unique within a tab.
    pub base_name: Option<String>,
    /// MIME -> extension for every payload persisted as its own file.
    ///
    /// The entry `("", "")` records "saved, but as an empty item"; the entry
    /// `("", "_copyq.dat")` records that a sidecar file holds residual
    /// payloads. An entry with an empty extension and a non-empty MIME means
    /// the base name itself (including its suffix characters) is the file.
    pub ext_map: BTreeMap<String, String>,
    /// MIME -> content hash of payloads synthesized from file paths.
    ///
    /// A payload whose hash still matches is dropped before saving so a
    /// synthetic file listing is never written back to disk as content.
    pub no_save: BTreeMap<String, Vec<u8>>,
    /// Source tab path set when this item was copied from another tab.
    pub sync_path: Option<PathBuf>,
}

impl SyncMeta {
    /// Whether a sidecar file is recorded for this item.
    pub fn has_sidecar(&self) -> bool {
        self.ext_map
            .get("")
            .is_some_and(|ext| ext == crate::sync::formats::SIDECAR_SUFFIX)
    }
}

/// One item: user payloads keyed by MIME type plus synchronization metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemData {
    /// User data, MIME type -> bytes. Never contains internal keys.
    pub payload: BTreeMap<String, Vec<u8>>,
    /// Synchronization bookkeeping. Never written to a file.
    pub meta: SyncMeta,
}

impl ItemData {
    /// Creates an item with a single payload.
    pub fn with_payload(mime: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let mut item = Self::default();
        item.payload.insert(mime.into(), bytes.into());
        item
    }

    /// Whether the item carries any user data at all.
    ///
    /// Items that hold only synchronization metadata are pruned when a tab
    /// stops syncing.
    pub fn has_user_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Whether the item is backed by files on disk.
    pub fn has_files(&self) -> bool {
        self.meta.base_name.is_some()
    }

    /// Merge another item into this one, update-style: payloads are inserted
    /// key by key and set metadata fields replace the current ones.
    pub fn merge(&mut self, other: &ItemData) {
        for (mime, bytes) in &other.payload {
            self.payload.insert(mime.clone(), bytes.clone());
        }
        if other.meta.base_name.is_some() {
            self.meta.base_name = other.meta.base_name.clone();
        }
        if !other.meta.ext_map.is_empty() {
            self.meta.ext_map = other.meta.ext_map.clone();
        }
        if !other.meta.no_save.is_empty() {
            self.meta.no_save = other.meta.no_save.clone();
        }
        if other.meta.sync_path.is_some() {
            self.meta.sync_path = other.meta.sync_path.clone();
        }
    }
}
