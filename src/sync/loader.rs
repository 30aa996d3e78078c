//! Loader façade: binds tab models to directories and owns their watchers.
//!
//! The loader holds the persisted settings (which tab syncs where, plus the
//! user format list), the registry of live [`FileWatcher`]s keyed by model
//! id, and the manifest lifecycle. Hosts route tab load/save, settings
//! changes, cross-tab copies and user removals through here.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use url::Url;

use crate::sync::codec;
use crate::sync::error::SyncError;
use crate::sync::formats::{FileFormat, MIME_TEXT, MIME_URI_LIST};
use crate::sync::materialize::{self, hash_bytes};
use crate::sync::scanner;
use crate::sync::watcher::{FileWatcher, DEFAULT_DEBOUNCE_MS};
use crate::tab::item::ItemData;
use crate::tab::model::{ModelId, SharedModel};

/// Persisted synchronization settings.
///
/// `sync_tabs` is a flat list alternating tab name and directory path;
/// `format_settings` is the ordered user format list. Field names match
/// the application's settings storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Alternating `tab_name, path, tab_name, path, ...`.
    #[serde(default)]
    pub sync_tabs: Vec<String>,
    /// User file formats, in match order.
    #[serde(default)]
    pub format_settings: Vec<FileFormat>,
}

impl SyncSettings {
    /// Parses settings from their JSON form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serializes settings to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Adds a synced tab entry.
    pub fn insert_tab(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.sync_tabs.push(name.into());
        self.sync_tabs.push(path.into());
    }
}

/// Owns the tab-to-path map, the user format list and all live watchers.
pub struct SyncLoader {
    tab_paths: BTreeMap<String, PathBuf>,
    formats: Vec<FileFormat>,
    watchers: BTreeMap<ModelId, FileWatcher>,
    debounce_ms: u64,
}

impl Default for SyncLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncLoader {
    /// Creates a loader with no settings applied.
    pub fn new() -> Self {
        Self {
            tab_paths: BTreeMap::new(),
            formats: Vec::new(),
            watchers: BTreeMap::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    /// Overrides the debounce interval of watchers created from here on.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Installs settings without touching existing watchers. Use at startup.
    pub fn load_settings(&mut self, settings: &SyncSettings) {
        self.tab_paths.clear();
        for pair in settings.sync_tabs.chunks(2) {
            let [name, path] = pair else { continue };
            if !name.is_empty() {
                self.tab_paths.insert(name.clone(), PathBuf::from(path));
            }
        }

        self.formats = settings.format_settings.clone();
        for format in &mut self.formats {
            format.normalize();
        }
    }

    /// Installs settings and propagates them to live watchers.
    ///
    /// Watchers whose path is still current get the new format rules and an
    /// immediate read pass. Watchers whose tab was re-pathed or unset are
    /// torn down; their files stay on disk, and a re-pathed tab gets a new
    /// watcher when the host next loads or creates it.
    pub fn apply_settings(&mut self, settings: &SyncSettings) {
        self.load_settings(settings);

        let tab_paths = &self.tab_paths;
        self.watchers.retain(|_, watcher| {
            let Some(model) = watcher.model() else {
                return false;
            };
            let Ok(m) = model.read() else { return false };
            tab_paths
                .get(m.tab_name())
                .is_some_and(|path| path == watcher.path())
        });

        for watcher in self.watchers.values_mut() {
            watcher.set_formats(self.formats.clone());
            if let Err(e) = watcher.update_now() {
                error!(
                    "settings refresh failed for {}: {e}",
                    watcher.path().display()
                );
            }
        }
    }

    /// Current settings in their persisted shape.
    pub fn settings(&self) -> SyncSettings {
        let mut settings = SyncSettings {
            sync_tabs: Vec::new(),
            format_settings: self.formats.clone(),
        };
        for (name, path) in &self.tab_paths {
            settings.insert_tab(name.clone(), path.to_string_lossy().into_owned());
        }
        settings
    }

    /// Whether the given model's tab is configured to sync.
    pub fn should_sync(&self, model: &SharedModel) -> bool {
        self.tab_path(model).is_some()
    }

    /// Configured directory for the given model's tab.
    pub fn tab_path(&self, model: &SharedModel) -> Option<PathBuf> {
        let m = model.read().ok()?;
        self.tab_paths.get(m.tab_name()).cloned()
    }

    /// The live watcher bound to the given model, if any.
    pub fn watcher_for(&self, model: &SharedModel) -> Option<&FileWatcher> {
        let id = model.read().ok()?.id();
        self.watchers.get(&id)
    }

    /// Pumps every live watcher and drops those whose model is gone.
    pub fn pump(&mut self) {
        self.watchers.retain(|_, watcher| watcher.model().is_some());
        for watcher in self.watchers.values_mut() {
            watcher.pump();
        }
    }

    /// Drops the watcher of an unloaded tab. Its files stay on disk.
    pub fn unload_tab(&mut self, model_id: ModelId) {
        self.watchers.remove(&model_id);
    }

    /// Loads a tab through its manifest.
    ///
    /// Returns `false` when the manifest is unreadable or foreign; the
    /// host then loads the tab through its own persistence. A synced tab
    /// gets a watcher on its configured path, hydrated from the manifest's
    /// files plus whatever else sits in the directory; a tab that is no
    /// longer configured but has files listed gets a watcher on the
    /// inferred old directory so later reconfiguration is detected.
    pub fn load_tab(
        &mut self,
        model: &SharedModel,
        reader: &mut impl Read,
    ) -> Result<bool, SyncError> {
        let manifest = match codec::read_manifest(reader) {
            Ok(manifest) => manifest,
            Err(_) => return Ok(false),
        };

        if self.should_sync(model) {
            if let Err(e) = self.create_watcher_and_load(model, &manifest.saved_files) {
                warn!("could not bind tab to its directory: {e}");
                return Ok(false);
            }
        } else if let Some(first) = manifest.saved_files.first() {
            let listed: Vec<PathBuf> = manifest.saved_files.iter().map(PathBuf::from).collect();
            if let Some(old_dir) = PathBuf::from(first).parent() {
                self.create_watcher(model, old_dir.to_path_buf(), listed)?;
            }
        }

        Ok(true)
    }

    /// Saves a tab: writes a fresh manifest listing every row's files.
    ///
    /// Returns `false` (after one log line) when the tab has no watcher,
    /// the watcher's path is empty or a failed pass invalidated it; the
    /// host then persists the tab itself.
    pub fn save_tab(
        &mut self,
        model: &SharedModel,
        writer: &mut impl Write,
    ) -> Result<bool, SyncError> {
        let Ok(m) = model.read() else {
            return Err(SyncError::ModelGone);
        };
        let Some(watcher) = self.watchers.get(&m.id()) else {
            return Ok(false);
        };

        let path = watcher.path().to_path_buf();
        if path.as_os_str().is_empty() || !watcher.is_valid() {
            error!(
                "failed to synchronize tab {:?} with directory {}",
                m.tab_name(),
                path.display()
            );
            return Ok(false);
        }

        let mut saved_files: Vec<String> = Vec::new();
        for row in (0..m.row_count()).rev() {
            let Some(item) = m.row(row) else { continue };
            let Some(base) = &item.meta.base_name else {
                continue;
            };
            let base_path = path.join(base);
            for ext in item.meta.ext_map.values() {
                saved_files.push(
                    materialize::file_with_extension(&base_path, ext)
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
        drop(m);

        codec::write_manifest(writer, &saved_files).map_err(|source| {
            SyncError::FileWriteFailed { path, source }
        })?;
        Ok(true)
    }

    /// Creates a new synced tab: pre-populates the manifest with a
    /// time-sorted directory listing, then loads through it.
    pub fn create_tab(
        &mut self,
        model: &SharedModel,
        file: &mut (impl Read + Write + Seek),
    ) -> Result<bool, SyncError> {
        if !self.should_sync(model) {
            return Ok(false);
        }
        let Some(path) = self.tab_path(model) else {
            return Ok(false);
        };

        let listing: Vec<String> = scanner::list_directory(&path)
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        codec::write_manifest(file, &listing).map_err(|source| SyncError::FileWriteFailed {
            path: path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| SyncError::FileReadFailed { path, source })?;

        self.load_tab(model, file)
    }

    /// Reacts to a tab whose configured sync state no longer matches the
    /// header of its persisted data.
    ///
    /// A newly synced tab gets a watcher; a tab that stopped syncing loses
    /// its watcher, keeps its files on disk and drops every row that holds
    /// nothing but synchronization metadata. Either way the model is marked
    /// dirty so the host persists the new state.
    pub fn tab_loaded(
        &mut self,
        model: &SharedModel,
        reader: &mut impl Read,
    ) -> Result<(), SyncError> {
        let was_synced = codec::has_manifest_header(reader);
        let sync_now = self.should_sync(model);
        if sync_now == was_synced {
            return Ok(());
        }

        {
            let Ok(mut m) = model.write() else {
                return Err(SyncError::ModelGone);
            };
            m.set_dirty(true);
        }

        if sync_now {
            self.create_watcher_and_load(model, &[])?;
        } else {
            let id = model.read().map_err(|_| SyncError::ModelGone)?.id();
            self.watchers.remove(&id);

            let Ok(mut m) = model.write() else {
                return Err(SyncError::ModelGone);
            };
            let mut row = 0;
            while row < m.row_count() {
                if m.row(row).is_some_and(ItemData::has_user_data) {
                    row += 1;
                } else {
                    m.remove_row(row);
                }
            }
        }

        Ok(())
    }

    /// Prepares an item copied out of the given tab.
    ///
    /// Stamps the source path so the receiving tab relocates the files, and
    /// synthesizes `text/plain` and `text/uri-list` payloads (one entry per
    /// file) unless the item already carries them. Their hashes go into the
    /// no-save map so the synthesized listings are never persisted as file
    /// content.
    pub fn copy_item(&self, model: &SharedModel, item: &ItemData) -> ItemData {
        let mut copied = item.clone();
        let Some(path) = self.tab_path(model) else {
            return copied;
        };
        copied.meta.sync_path = Some(path.clone());

        let need_uris = !copied.payload.contains_key(MIME_URI_LIST);
        let need_text = !copied.payload.contains_key(MIME_TEXT);
        if !need_uris && !need_text {
            return copied;
        }
        let Some(base) = &item.meta.base_name else {
            return copied;
        };
        let base_path = path.join(base);

        let mut uris: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for ext in item.meta.ext_map.values() {
            let file = materialize::file_with_extension(&base_path, ext);
            if need_uris {
                let uri = Url::from_file_path(&file)
                    .map(|url| url.to_string())
                    .unwrap_or_else(|()| format!("file://{}", file.display()));
                uris.push(uri);
            }
            if need_text {
                texts.push(
                    file.display()
                        .to_string()
                        .replace('\\', "\\\\")
                        .replace('\n', "\\n")
                        .replace('\r', "\\r"),
                );
            }
        }

        if need_uris {
            let bytes = uris.join("\n").into_bytes();
            copied
                .meta
                .no_save
                .insert(MIME_URI_LIST.to_string(), hash_bytes(&bytes).to_vec());
            copied.payload.insert(MIME_URI_LIST.to_string(), bytes);
        }
        if need_text {
            let bytes = texts.join("\n").into_bytes();
            copied
                .meta
                .no_save
                .insert(MIME_TEXT.to_string(), hash_bytes(&bytes).to_vec());
            copied.payload.insert(MIME_TEXT.to_string(), bytes);
        }

        copied
    }

    /// Whether removing these items would also delete files on disk.
    ///
    /// Hosts use this to decide if the user should confirm the removal.
    pub fn items_have_files(items: &[ItemData]) -> bool {
        items.iter().any(ItemData::has_files)
    }

    /// Deletes the files of items the user removed.
    ///
    /// An item whose base name still occurs in the model was moved, not
    /// removed; its files stay.
    pub fn items_removed_by_user(&self, model: &SharedModel, removed: &[ItemData]) {
        let Some(path) = self.tab_path(model) else {
            return;
        };
        let Ok(m) = model.read() else {
            return;
        };

        for item in removed {
            let Some(base) = &item.meta.base_name else {
                continue;
            };
            if m.find_base_name(base).is_some() {
                continue;
            }
            let base_path = path.join(base);
            if item.meta.ext_map.is_empty() {
                let _ = fs::remove_file(&base_path);
            } else {
                materialize::remove_format_files(&base_path, &item.meta.ext_map);
            }
        }
    }

    fn create_watcher_and_load(
        &mut self,
        model: &SharedModel,
        listed: &[String],
    ) -> Result<(), SyncError> {
        let Some(path) = self.tab_path(model) else {
            return Ok(());
        };
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&path).map_err(|source| {
            error!(
                "failed to create synchronization directory {}",
                path.display()
            );
            SyncError::DirectoryCreateFailed {
                path: path.clone(),
                source,
            }
        })?;

        let mut files: Vec<PathBuf> = listed.iter().map(PathBuf::from).collect();
        for file in scanner::list_directory(&path)? {
            if !files.contains(&file) {
                files.push(file);
            }
        }

        self.create_watcher(model, path, files)
    }

    fn create_watcher(
        &mut self,
        model: &SharedModel,
        path: PathBuf,
        files: Vec<PathBuf>,
    ) -> Result<(), SyncError> {
        let watcher = FileWatcher::new(path, files, model, self.formats.clone(), self.debounce_ms)?;
        self.watchers.insert(watcher.model_id(), watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::model::TabModel;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::tempdir;

    fn loader_for(tabs: &[(&str, &Path)]) -> SyncLoader {
        let mut settings = SyncSettings::default();
        for (name, path) in tabs {
            settings.insert_tab(*name, path.to_string_lossy());
        }
        let mut loader = SyncLoader::new().with_debounce_ms(10);
        loader.load_settings(&settings);
        loader
    }

    fn shared(name: &str) -> SharedModel {
        TabModel::new(name, 100).into_shared()
    }

    #[test]
    fn settings_round_trip_through_json() {
        let json = r#"{
            "sync_tabs": ["notes", "/data/notes", "scratch", "/data/scratch"],
            "format_settings": [
                {"formats": ["md", ".markdown"], "itemMime": "text/markdown", "icon": "pencil"}
            ]
        }"#;
        let settings = SyncSettings::from_json(json).unwrap();
        assert_eq!(settings.sync_tabs.len(), 4);
        assert_eq!(settings.format_settings[0].item_mime, "text/markdown");

        let mut loader = SyncLoader::new();
        loader.load_settings(&settings);
        // Extensions get their leading dot on load.
        assert_eq!(loader.formats[0].extensions, vec![".md", ".markdown"]);
        assert_eq!(
            loader.tab_paths.get("notes"),
            Some(&PathBuf::from("/data/notes"))
        );

        let reparsed = SyncSettings::from_json(&loader.settings().to_json().unwrap()).unwrap();
        assert_eq!(reparsed.sync_tabs, settings.sync_tabs);
    }

    #[test]
    fn create_tab_binds_and_save_tab_lists_files() {
        let temp = tempdir().unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut manifest = Cursor::new(Vec::new());
        assert!(loader.create_tab(&model, &mut manifest).unwrap());
        assert!(loader.watcher_for(&model).is_some());

        model
            .write()
            .unwrap()
            .insert_row(0, ItemData::with_payload("text/plain", "hello"));
        loader.pump();
        assert!(temp.path().join("copyq_0000.txt").exists());

        let mut saved = Cursor::new(Vec::new());
        assert!(loader.save_tab(&model, &mut saved).unwrap());
        saved.set_position(0);
        let manifest = codec::read_manifest(&mut saved).unwrap();
        assert_eq!(manifest.saved_files.len(), 1);
        assert!(manifest.saved_files[0].ends_with("copyq_0000.txt"));
    }

    #[test]
    fn foreign_data_falls_back_to_host_persistence() {
        let temp = tempdir().unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut reader = Cursor::new(b"not a manifest".to_vec());
        assert!(!loader.load_tab(&model, &mut reader).unwrap());
        assert!(loader.watcher_for(&model).is_none());
    }

    #[test]
    fn save_without_watcher_falls_back() {
        let model = shared("notes");
        let mut loader = SyncLoader::new();
        let mut out = Cursor::new(Vec::new());
        assert!(!loader.save_tab(&model, &mut out).unwrap());
    }

    #[test]
    fn unconfigured_tab_with_listed_files_gets_a_watcher() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("old.txt"), "legacy").unwrap();

        let mut manifest = Cursor::new(Vec::new());
        let listed = vec![temp
            .path()
            .join("old.txt")
            .to_string_lossy()
            .into_owned()];
        codec::write_manifest(&mut manifest, &listed).unwrap();
        manifest.set_position(0);

        let model = shared("legacy");
        let mut loader = SyncLoader::new().with_debounce_ms(10);
        assert!(loader.load_tab(&model, &mut manifest).unwrap());

        let watcher = loader.watcher_for(&model).unwrap();
        assert_eq!(watcher.path(), temp.path());
        assert_eq!(model.read().unwrap().row_count(), 1);
    }

    #[test]
    fn cross_tab_copy_relocates_files_without_persisting_synthesis() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let model_a = shared("a");
        let model_b = shared("b");
        let mut loader = loader_for(&[("a", dir_a.path()), ("b", dir_b.path())]);

        let mut manifest_a = Cursor::new(Vec::new());
        loader.create_tab(&model_a, &mut manifest_a).unwrap();
        model_a
            .write()
            .unwrap()
            .insert_row(0, ItemData::with_payload("text/plain", "shared content"));
        loader.pump();

        let item = model_a.read().unwrap().row(0).unwrap().clone();
        let copied = loader.copy_item(&model_a, &item);
        assert_eq!(copied.meta.sync_path.as_deref(), Some(dir_a.path()));
        assert!(copied.payload.contains_key(MIME_URI_LIST));
        assert!(copied.meta.no_save.contains_key(MIME_URI_LIST));
        // text/plain was real user data, so it is not marked no-save.
        assert!(!copied.meta.no_save.contains_key(MIME_TEXT));

        let mut manifest_b = Cursor::new(Vec::new());
        loader.create_tab(&model_b, &mut manifest_b).unwrap();
        model_b.write().unwrap().insert_row(0, copied);
        loader.pump();

        assert_eq!(
            std::fs::read(dir_b.path().join("copyq_0000.txt")).unwrap(),
            b"shared content"
        );
        assert!(!dir_b.path().join("copyq_0000.uri").exists());
        let m = model_b.read().unwrap();
        let row = m.row(0).unwrap();
        assert!(row.meta.sync_path.is_none());
        assert!(!row.payload.contains_key(MIME_URI_LIST));
    }

    #[test]
    fn unsynced_tab_keeps_files_and_prunes_metadata_rows() {
        let temp = tempdir().unwrap();
        let model = shared("notes");

        // First life: the tab synced and wrote a manifest.
        {
            let mut loader = loader_for(&[("notes", temp.path())]);
            let mut manifest = Cursor::new(Vec::new());
            loader.create_tab(&model, &mut manifest).unwrap();
            model
                .write()
                .unwrap()
                .insert_row(0, ItemData::with_payload("text/plain", "keep me"));
            loader.pump();
        }

        // A row that only ever held sync metadata.
        {
            let mut m = model.write().unwrap();
            let mut bare = ItemData::default();
            bare.meta.base_name = Some("ghost".into());
            bare.meta.ext_map.insert(String::new(), String::new());
            m.insert_row(1, bare);
        }

        // Second life: the tab is no longer configured to sync.
        let mut loader = SyncLoader::new().with_debounce_ms(10);
        let mut persisted = Cursor::new(Vec::new());
        codec::write_manifest(&mut persisted, &[]).unwrap();
        persisted.set_position(0);
        loader.tab_loaded(&model, &mut persisted).unwrap();

        let m = model.read().unwrap();
        assert!(m.dirty());
        assert_eq!(m.row_count(), 1);
        assert!(m.row(0).unwrap().has_user_data());
        assert!(temp.path().join("copyq_0000.txt").exists());
        drop(m);
        assert!(loader.watcher_for(&model).is_none());
    }

    #[test]
    fn removed_items_lose_their_files_unless_name_still_present() {
        let temp = tempdir().unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut manifest = Cursor::new(Vec::new());
        loader.create_tab(&model, &mut manifest).unwrap();
        {
            let mut m = model.write().unwrap();
            m.insert_row(0, ItemData::with_payload("text/plain", "first"));
            m.insert_row(0, ItemData::with_payload("text/plain", "second"));
        }
        loader.pump();

        let (removed, kept) = {
            let mut m = model.write().unwrap();
            let removed = m.row(1).unwrap().clone();
            let kept = m.row(0).unwrap().clone();
            m.remove_row(1);
            (removed, kept)
        };

        assert!(SyncLoader::items_have_files(std::slice::from_ref(&removed)));

        // Still listed under its name: treated as a move, files stay.
        loader.items_removed_by_user(&model, std::slice::from_ref(&kept));
        let kept_base = kept.meta.base_name.clone().unwrap();
        assert!(temp.path().join(format!("{kept_base}.txt")).exists());

        // Truly gone: files are deleted.
        loader.items_removed_by_user(&model, std::slice::from_ref(&removed));
        let removed_base = removed.meta.base_name.unwrap();
        assert!(!temp.path().join(format!("{removed_base}.txt")).exists());
    }

    #[test]
    fn apply_settings_tears_down_unset_tabs() {
        let temp = tempdir().unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut manifest = Cursor::new(Vec::new());
        loader.create_tab(&model, &mut manifest).unwrap();
        model
            .write()
            .unwrap()
            .insert_row(0, ItemData::with_payload("text/plain", "kept on disk"));
        loader.pump();
        assert!(loader.watcher_for(&model).is_some());

        loader.apply_settings(&SyncSettings::default());

        assert!(loader.watcher_for(&model).is_none());
        assert!(temp.path().join("copyq_0000.txt").exists());
    }

    #[tokio::test]
    async fn run_sync_loop_drives_watchers() {
        let temp = tempdir().unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut manifest = Cursor::new(Vec::new());
        loader.create_tab(&model, &mut manifest).unwrap();
        model
            .write()
            .unwrap()
            .insert_row(0, ItemData::with_payload("text/plain", "looped"));

        // The loop never returns on its own; give it a slice of time.
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            crate::run_sync_loop(&mut loader, 10),
        )
        .await;

        assert_eq!(
            std::fs::read(temp.path().join("copyq_0000.txt")).unwrap(),
            b"looped"
        );
    }

    #[test]
    fn apply_settings_refreshes_format_rules() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("doc.rst"), "unrecognized").unwrap();
        let model = shared("notes");
        let mut loader = loader_for(&[("notes", temp.path())]);

        let mut manifest = Cursor::new(Vec::new());
        loader.create_tab(&model, &mut manifest).unwrap();
        assert_eq!(model.read().unwrap().row_count(), 0);

        // New format rule: .rst files carry reStructuredText.
        let mut settings = loader.settings();
        settings.format_settings.push(FileFormat {
            extensions: vec![".rst".into()],
            item_mime: "text/x-rst".into(),
            icon: String::new(),
        });
        loader.apply_settings(&settings);

        let m = model.read().unwrap();
        assert_eq!(m.row_count(), 1);
        assert_eq!(m.row(0).unwrap().payload["text/x-rst"], b"unrecognized");
    }
}
