//! The synchronization engine for one tab.
//!
//! A [`FileWatcher`] owns the binding between a tab model and a directory.
//! Raw filesystem events arrive over an mpsc channel from a [`notify`]
//! watcher and only restart a single-shot debounce deadline; model row
//! events arrive over the model's broadcast channel. Pumping the watcher
//! drains both queues and runs the two reconciliation passes:
//!
//! - **write** (model rows changed): allocate unique base names, move or
//!   copy files that belong to renamed rows, then materialize each row with
//!   content-hash elision;
//! - **read** (debounce fired): bucket the directory, rewrite matching
//!   rows, drop rows whose files vanished and insert items for new files.
//!
//! Both passes run under a [`ModelGate`], so the model emits no signals
//! while the engine mutates it; filesystem echoes of the engine's own
//! writes reconcile to no-ops because the read pass hash-compares against
//! disk.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::sync::basename;
use crate::sync::error::SyncError;
use crate::sync::formats::FileFormat;
use crate::sync::materialize::{self, HashCache};
use crate::sync::scanner;
use crate::tab::item::ItemData;
use crate::tab::model::{ModelGate, ModelId, RowEvent, RowId, SharedModel, TabModel};

/// Default debounce interval between a filesystem event and the read pass.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

const HASH_CACHE_CAPACITY: usize = 4096;

/// Direction of a completed reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Disk state was read into the model.
    Read,
    /// Model state was written to disk.
    Write,
}

/// Notification sent to observers after every completed pass.
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    /// Which pass completed.
    pub direction: SyncDirection,
    /// Base paths (write) or listed files (read) the pass covered.
    pub paths: Vec<PathBuf>,
}

/// Debounced, gated synchronizer between one tab model and one directory.
pub struct FileWatcher {
    path: PathBuf,
    model: Weak<RwLock<TabModel>>,
    model_id: ModelId,
    formats: Vec<FileFormat>,
    fs_watcher: RecommendedWatcher,
    fs_rx: Receiver<notify::Result<Event>>,
    model_rx: broadcast::Receiver<RowEvent>,
    watched: HashSet<PathBuf>,
    debounce: Duration,
    deadline: Option<Instant>,
    valid: bool,
    prior_names: HashMap<RowId, String>,
    hash_cache: HashCache,
    updates: broadcast::Sender<SyncUpdate>,
}

impl FileWatcher {
    /// Binds a model to a directory and hydrates it.
    ///
    /// The directory and every prior file are watched, a read pass runs
    /// over the prior file list and a write pass then normalizes the names
    /// of whatever rows resulted. Pass failures leave the watcher invalid
    /// but are not fatal to construction; they are logged here.
    pub fn new(
        path: impl Into<PathBuf>,
        prior_files: Vec<PathBuf>,
        model: &SharedModel,
        formats: Vec<FileFormat>,
        debounce_ms: u64,
    ) -> Result<Self, SyncError> {
        let (tx, fs_rx) = channel();
        let fs_watcher = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                let _ = tx.send(event);
            },
            Config::default(),
        )?;

        let (model_id, model_rx) = {
            let m = model.read().map_err(|_| SyncError::ModelGone)?;
            (m.id(), m.subscribe())
        };
        let (updates, _) = broadcast::channel(64);

        let mut watcher = Self {
            path: path.into(),
            model: Arc::downgrade(model),
            model_id,
            formats,
            fs_watcher,
            fs_rx,
            model_rx,
            watched: HashSet::new(),
            debounce: Duration::from_millis(debounce_ms),
            deadline: None,
            valid: false,
            prior_names: HashMap::new(),
            hash_cache: HashCache::new(HASH_CACHE_CAPACITY),
            updates,
        };

        let dir = watcher.path.clone();
        watcher.watch_path(&dir);
        for file in &prior_files {
            watcher.watch_path(file);
        }

        if let Err(e) = watcher.reconcile_with(prior_files) {
            warn!("initial read pass failed for {}: {e}", watcher.path.display());
        } else if let Err(e) = watcher.save_all() {
            warn!("initial write pass failed for {}: {e}", watcher.path.display());
        }

        Ok(watcher)
    }

    /// Directory this watcher synchronizes with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the last pass completed; an invalid watcher makes the host
    /// fall back to its default persistence.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Id of the bound model.
    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// The bound model, while it is still alive.
    pub fn model(&self) -> Option<SharedModel> {
        self.model.upgrade()
    }

    /// Subscribe to pass notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    /// Replaces the format snapshot; the next pass applies the new rules.
    pub fn set_formats(&mut self, formats: Vec<FileFormat>) {
        self.formats = formats;
    }

    /// Drains queued events and runs whichever passes are due.
    ///
    /// Call this from the host's event loop. Model events emitted by the
    /// engine's own passes never reach the queue (the model is muted while
    /// a pass runs), so pumping cannot feed back into itself.
    pub fn pump(&mut self) {
        self.drain_fs_events();
        self.drain_model_events();
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.deadline = None;
            if let Err(e) = self.reconcile() {
                error!("read pass failed for {}: {e}", self.path.display());
            }
        }
    }

    /// Runs a read pass immediately, bypassing the debounce.
    ///
    /// Used on settings changes, where new format rules must apply without
    /// waiting for a filesystem event.
    pub fn update_now(&mut self) -> Result<(), SyncError> {
        self.deadline = None;
        self.reconcile()
    }

    fn restart_debounce(&mut self) {
        self.deadline = Some(Instant::now() + self.debounce);
    }

    fn drain_fs_events(&mut self) {
        let mut seen = false;
        while let Ok(event) = self.fs_rx.try_recv() {
            match event {
                Ok(event) => {
                    debug!("fs event {:?} on {:?}", event.kind, event.paths);
                    seen = true;
                }
                Err(e) => {
                    warn!("watch error for {}: {e}", self.path.display());
                    seen = true;
                }
            }
        }
        if seen {
            // Single-shot, restarted by every event: bursts coalesce into
            // one read pass after the interval of quiet.
            self.restart_debounce();
        }
    }

    fn drain_model_events(&mut self) {
        let mut pending: Vec<RowId> = Vec::new();
        loop {
            match self.model_rx.try_recv() {
                Ok(RowEvent::Inserted { ids } | RowEvent::Changed { ids }) => {
                    pending.extend(ids);
                }
                Ok(RowEvent::Removed { ids }) => {
                    self.flush_pending(&mut pending);
                    for id in ids {
                        self.prior_names.remove(&id);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("model event queue lagged by {skipped}; forcing a read pass");
                    self.restart_debounce();
                }
                Err(_) => break,
            }
        }
        self.flush_pending(&mut pending);
    }

    fn flush_pending(&mut self, pending: &mut Vec<RowId>) {
        if pending.is_empty() {
            return;
        }
        let ids = std::mem::take(pending);
        if let Err(e) = self.save_ids(&ids) {
            error!("write pass failed for {}: {e}", self.path.display());
        }
    }

    fn watch_path(&mut self, path: &Path) {
        if self.watched.contains(path) || !path.exists() {
            return;
        }
        match self.fs_watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.watched.insert(path.to_path_buf());
            }
            Err(e) => debug!("could not watch {}: {e}", path.display()),
        }
    }

    fn upgrade_model(&self) -> Result<SharedModel, SyncError> {
        self.model.upgrade().ok_or(SyncError::ModelGone)
    }

    /// Read pass over the directory's current contents.
    fn reconcile(&mut self) -> Result<(), SyncError> {
        self.valid = false;
        let files = scanner::list_directory(&self.path)?;
        self.reconcile_with(files)
    }

    /// Read pass over an explicit file list (direction R).
    fn reconcile_with(&mut self, files: Vec<PathBuf>) -> Result<(), SyncError> {
        let model = self.upgrade_model()?;
        self.valid = false;
        let _gate = ModelGate::acquire(&model);

        let mut buckets: Vec<Option<scanner::BaseNameBucket>> =
            scanner::scan_files(&files, &self.formats)
                .into_iter()
                .map(Some)
                .collect();
        let mut touched: Vec<PathBuf> = Vec::new();

        {
            let Ok(mut m) = model.write() else {
                return Err(SyncError::ModelGone);
            };

            let mut row = 0;
            while row < m.row_count() {
                let base = m.row(row).and_then(|item| item.meta.base_name.clone());
                let bucket = base.as_deref().and_then(|base| {
                    buckets
                        .iter_mut()
                        .find(|slot| slot.as_ref().is_some_and(|b| b.base == base))
                        .and_then(Option::take)
                });

                let hydrated = bucket.map(|b| materialize::hydrate_bucket(&self.path, &b));
                match hydrated {
                    Some(h) if !h.ext_map.is_empty() => {
                        let item = ItemData {
                            payload: h.payload,
                            meta: crate::tab::item::SyncMeta {
                                base_name: base,
                                ext_map: h.ext_map,
                                ..Default::default()
                            },
                        };
                        touched.extend(h.files);
                        m.set_row(row, item);
                        row += 1;
                    }
                    _ => {
                        // All files gone, or the row never had any.
                        if let Some(id) = m.remove_row(row) {
                            self.prior_names.remove(&id);
                        }
                    }
                }
            }

            for bucket in buckets.into_iter().flatten() {
                if m.row_count() >= m.max_items() {
                    break;
                }
                let h = materialize::hydrate_bucket(&self.path, &bucket);
                if h.ext_map.is_empty() {
                    continue;
                }
                let item = ItemData {
                    payload: h.payload,
                    meta: crate::tab::item::SyncMeta {
                        base_name: Some(bucket.base.clone()),
                        ext_map: h.ext_map,
                        ..Default::default()
                    },
                };
                touched.extend(h.files);
                match m.insert_row(0, item) {
                    Some(id) => {
                        self.prior_names.insert(id, bucket.base);
                    }
                    None => break,
                }
            }
        }

        for file in &files {
            self.watch_path(file);
        }
        for file in &touched {
            self.watch_path(file);
        }

        self.valid = true;
        let _ = self.updates.send(SyncUpdate {
            direction: SyncDirection::Read,
            paths: files,
        });
        Ok(())
    }

    /// Write pass over every row.
    fn save_all(&mut self) -> Result<(), SyncError> {
        let model = self.upgrade_model()?;
        let ids: Vec<RowId> = {
            let m = model.read().map_err(|_| SyncError::ModelGone)?;
            (0..m.row_count()).filter_map(|i| m.row_id(i)).collect()
        };
        if ids.is_empty() {
            self.valid = true;
            return Ok(());
        }
        self.save_ids(&ids)
    }

    /// Write pass over the rows with the given ids (direction W).
    fn save_ids(&mut self, ids: &[RowId]) -> Result<(), SyncError> {
        let model = self.upgrade_model()?;
        self.valid = false;
        let _gate = ModelGate::acquire(&model);

        // Resolve ids to current indices; rows removed in the meantime are
        // simply no longer ours to save.
        let mut rows: Vec<usize> = {
            let m = model.read().map_err(|_| SyncError::ModelGone)?;
            ids.iter().filter_map(|id| m.index_of(*id)).collect()
        };
        rows.sort_unstable();
        rows.dedup();

        self.rename_to_unique(&model, &rows)?;

        if self.path.as_os_str().is_empty() {
            // Nowhere to write; the host saves through its own path.
            return Ok(());
        }

        std::fs::create_dir_all(&self.path).map_err(|source| {
            error!(
                "failed to create synchronization directory {}",
                self.path.display()
            );
            SyncError::DirectoryCreateFailed {
                path: self.path.clone(),
                source,
            }
        })?;

        let mut existing = materialize::existing_hashes(&self.path, &mut self.hash_cache);
        let mut written: Vec<PathBuf> = Vec::new();

        {
            let Ok(mut m) = model.write() else {
                return Err(SyncError::ModelGone);
            };
            for &row in &rows {
                let Some(item) = m.row(row).cloned() else {
                    break;
                };
                let Some(base) = item.meta.base_name.clone() else {
                    continue;
                };
                let base_path = self.path.join(&base);
                if let Some(updated) = materialize::write_row(&base_path, &item, &mut existing)? {
                    m.set_row(row, updated);
                    if let Some(id) = m.row_id(row) {
                        self.prior_names.insert(id, base.clone());
                    }
                }
                written.push(base_path);
            }
        }

        self.valid = true;
        let _ = self.updates.send(SyncUpdate {
            direction: SyncDirection::Write,
            paths: written,
        });
        Ok(())
    }

    /// Gives every row in the set a unique base name and relocates files.
    ///
    /// Files follow the name: a renamed row's files move from the name they
    /// were last saved under (tracked per row id, surviving renames that
    /// precede a save); a row copied from another tab gets its files copied
    /// from the source path instead.
    fn rename_to_unique(&mut self, model: &SharedModel, rows: &[usize]) -> Result<(), SyncError> {
        let Ok(mut m) = model.write() else {
            return Err(SyncError::ModelGone);
        };

        let in_set: HashSet<usize> = rows.iter().copied().collect();
        let mut used: BTreeSet<String> = (0..m.row_count())
            .filter(|i| !in_set.contains(i))
            .filter_map(|i| m.row(i).and_then(|item| item.meta.base_name.clone()))
            .collect();

        for &row in rows {
            let Some(item_ref) = m.row(row) else {
                break;
            };
            let mut item = item_ref.clone();
            let old_base = item.meta.base_name.clone().unwrap_or_default();
            let new_base = basename::unique_name(&old_base, &mut used, &self.formats)?;

            let id = m.row_id(row);
            let sync_path = item.meta.sync_path.clone();
            let cross_tab = sync_path.as_ref().is_some_and(|p| p != &self.path);
            let renamed = new_base != old_base;

            if let Some(source) = &sync_path {
                if cross_tab || renamed {
                    materialize::copy_format_files(
                        &source.join(&old_base),
                        &self.path.join(&new_base),
                        &item.meta.ext_map,
                    )?;
                }
            } else {
                let prior = id
                    .and_then(|id| self.prior_names.get(&id))
                    .filter(|prior| !prior.is_empty() && **prior != new_base)
                    .cloned();
                if let Some(prior) = prior {
                    materialize::move_format_files(
                        &self.path.join(&prior),
                        &self.path.join(&new_base),
                        &item.meta.ext_map,
                    )?;
                }
            }

            if let Some(id) = id {
                self.prior_names.insert(id, new_base.clone());
            }

            if cross_tab || renamed || item.meta.sync_path.is_some() {
                item.meta.sync_path = None;
                item.meta.base_name = Some(new_base);
                m.set_row(row, item);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("path", &self.path)
            .field("valid", &self.valid)
            .field("watched", &self.watched.len())
            .finish()
    }
}
