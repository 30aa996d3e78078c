//! tabsync
//!
//! Bidirectional synchronization between ordered tabs of clipboard-like
//! items and directories on disk. Every item is reflected as one or more
//! files sharing a base name (one extension per MIME type, plus a sidecar
//! for MIME types with no extension mapping), and every recognized file is
//! reflected as an item. Edits on either side propagate to the other
//! within a debounce interval.
//!
//! ## Flow
//!
//! ```text
//! Model row change                    Filesystem change
//!        ↓                                   ↓
//! RowEvent (broadcast)              notify event (mpsc)
//!        ↓                                   ↓
//! FileWatcher::pump()  ←── host event loop ──┘
//!        ↓                         ↓
//! write pass (model → files)   debounce, then read pass (files → model)
//!   unique base names            bucket by base name
//!   hash-elided writes           hydrate / insert / remove rows
//!        ↓                         ↓
//!   both passes run with the model muted (no feedback)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use tabsync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut settings = SyncSettings::default();
//!     settings.insert_tab("notes", "/data/notes");
//!
//!     let mut loader = SyncLoader::new();
//!     loader.load_settings(&settings);
//!
//!     let model = TabModel::new("notes", 200).into_shared();
//!     let mut manifest = Cursor::new(Vec::new());
//!     loader.create_tab(&model, &mut manifest)?;
//!
//!     tabsync::run_sync_loop(&mut loader, 50).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module structure
//!
//! - [`tab`]: the item type and the observable tab model
//! - [`sync`]: the engine — format registry, base-name allocator, codecs,
//!   scanner, materializer, watcher and the loader façade

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod sync;
pub mod tab;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::sync::{
        FileFormat, FileWatcher, Manifest, SyncDirection, SyncError, SyncLoader, SyncSettings,
        SyncUpdate, DEFAULT_DEBOUNCE_MS,
    };
    pub use crate::tab::{ItemData, ModelGate, RowEvent, SharedModel, SyncMeta, TabModel};
}

/// Runs the synchronization event loop.
///
/// Pumps every live watcher on a fixed interval: queued model events run
/// write passes, quiet periods after filesystem events run read passes.
/// The loop never returns; spawn it or race it against a shutdown signal.
pub async fn run_sync_loop(loader: &mut sync::SyncLoader, poll_interval_ms: u64) {
    let poll_interval = std::time::Duration::from_millis(poll_interval_ms);
    loop {
        loader.pump();
        tokio::time::sleep(poll_interval).await;
    }
}
