//! Materializing items as files and files as items.
//!
//! The write direction turns one model row into a set of `<base><ext>`
//! files plus an optional sidecar; the read direction turns a scanned
//! bucket back into payloads. Writes are elided whenever a file with the
//! same content hash already sits at the same path, so echo events from
//! the filesystem watcher reconcile to no-ops.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lru::LruCache;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::sync::codec;
use crate::sync::error::SyncError;
use crate::sync::formats::{self, SIDECAR_SUFFIX};
use crate::sync::scanner::{self, BaseNameBucket};
use crate::tab::item::ItemData;

/// Files above this size are never hashed and never become payloads; they
/// are tracked by presence only.
pub const SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// SHA-1 digest of a payload or file.
pub type ContentHash = [u8; 20];

/// Content hash of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    Sha1::digest(bytes).into()
}

/// Bounded cache of file content hashes.
///
/// Reconciliation hashes every file in the directory once per pass; the
/// cache keys on `(mtime, len)` so unchanged files are not re-read, and
/// LRU eviction keeps memory bounded for large directories.
pub struct HashCache {
    entries: LruCache<PathBuf, (SystemTime, u64, ContentHash)>,
}

impl HashCache {
    /// Creates a cache holding at most `capacity` file hashes.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Hash of the file's content, or `None` for files over [`SIZE_LIMIT`].
    pub fn hash_file(&mut self, path: &Path) -> std::io::Result<Option<ContentHash>> {
        let metadata = fs::metadata(path)?;
        if metadata.len() > SIZE_LIMIT {
            return Ok(None);
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some((cached_mtime, cached_len, hash)) = self.entries.get(path) {
            if *cached_mtime == modified && *cached_len == metadata.len() {
                return Ok(Some(*hash));
            }
        }

        let hash = hash_bytes(&fs::read(path)?);
        self.entries
            .put(path.to_path_buf(), (modified, metadata.len(), hash));
        Ok(Some(hash))
    }
}

/// Hash -> paths multimap over a directory's visible files.
///
/// Drives write elision: a payload whose hash already maps to its target
/// path needs no write. Unreadable and oversized files are left out.
pub fn existing_hashes(
    dir: &Path,
    cache: &mut HashCache,
) -> HashMap<ContentHash, Vec<PathBuf>> {
    let mut map: HashMap<ContentHash, Vec<PathBuf>> = HashMap::new();
    let Ok(files) = scanner::list_directory(dir) else {
        return map;
    };
    for path in files {
        match cache.hash_file(&path) {
            Ok(Some(hash)) => map.entry(hash).or_default().push(path),
            Ok(None) => {}
            Err(error) => debug!("skipping unreadable {}: {error}", path.display()),
        }
    }
    map
}

/// Appends an extension to a base path without touching its directory part.
pub fn file_with_extension(base_path: &Path, ext: &str) -> PathBuf {
    let mut os = OsString::from(base_path.as_os_str());
    os.push(ext);
    PathBuf::from(os)
}

/// Writes a payload to `path` unless an identical file is already there.
///
/// Returns whether bytes hit the disk. An elided write consumes the
/// matching `(hash, path)` entry from the multimap.
pub fn save_item_file(
    path: &Path,
    bytes: &[u8],
    existing: &mut HashMap<ContentHash, Vec<PathBuf>>,
) -> Result<bool, SyncError> {
    let hash = hash_bytes(bytes);
    if let Some(paths) = existing.get_mut(&hash) {
        if let Some(at) = paths.iter().position(|p| p == path) {
            paths.remove(at);
            return Ok(false);
        }
    }
    fs::write(path, bytes).map_err(|source| SyncError::FileWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Removes the file of every extension in the map. Missing files are fine.
pub fn remove_format_files(base_path: &Path, ext_map: &BTreeMap<String, String>) {
    for ext in ext_map.values() {
        let path = file_with_extension(base_path, ext);
        if let Err(error) = fs::remove_file(&path) {
            debug!("could not remove {}: {error}", path.display());
        }
    }
}

/// Renames every extension's file from one base path to another.
pub fn move_format_files(
    old_base: &Path,
    new_base: &Path,
    ext_map: &BTreeMap<String, String>,
) -> Result<(), SyncError> {
    for ext in ext_map.values() {
        let src = file_with_extension(old_base, ext);
        if !src.is_file() {
            continue;
        }
        let dst = file_with_extension(new_base, ext);
        fs::rename(&src, &dst).map_err(|source| SyncError::FileWriteFailed {
            path: dst.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Copies every extension's file from one base path to another.
pub fn copy_format_files(
    old_base: &Path,
    new_base: &Path,
    ext_map: &BTreeMap<String, String>,
) -> Result<(), SyncError> {
    for ext in ext_map.values() {
        let src = file_with_extension(old_base, ext);
        if !src.is_file() {
            continue;
        }
        let dst = file_with_extension(new_base, ext);
        fs::copy(&src, &dst).map_err(|source| SyncError::FileWriteFailed {
            path: dst.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Writes one row's payloads under its base path.
///
/// Payloads whose hash matches a no-save entry are dropped; payloads with
/// no extension binding accumulate into the sidecar. Returns the updated
/// item when its metadata changed (the caller stores it back), `None` when
/// the row is already in sync.
pub fn write_row(
    base_path: &Path,
    item: &ItemData,
    existing: &mut HashMap<ContentHash, Vec<PathBuf>>,
) -> Result<Option<ItemData>, SyncError> {
    let mut item = item.clone();
    let old_ext_map = item.meta.ext_map.clone();
    let no_save = item.meta.no_save.clone();

    let mut new_ext_map: BTreeMap<String, String> = BTreeMap::new();
    let mut residual: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    for (mime, bytes) in item.payload.clone() {
        if no_save.get(&mime).map(Vec::as_slice) == Some(hash_bytes(&bytes).as_slice()) {
            // A synthesized payload that was never edited; forget it.
            item.payload.remove(&mime);
            continue;
        }

        match formats::by_format(&mime, &old_ext_map) {
            Some(ext) => {
                save_item_file(&file_with_extension(base_path, &ext), &bytes, existing)?;
                new_ext_map.insert(mime, ext);
            }
            None => {
                residual.insert(mime, bytes);
            }
        }
    }

    if new_ext_map.is_empty() {
        // Distinguishes "saved as an empty item" from "never saved".
        new_ext_map.insert(String::new(), String::new());
    }
    if !residual.is_empty() {
        new_ext_map.insert(String::new(), SIDECAR_SUFFIX.to_string());
        save_item_file(
            &file_with_extension(base_path, SIDECAR_SUFFIX),
            &codec::encode_map(&residual),
            existing,
        )?;
    }

    if no_save.is_empty() && new_ext_map == old_ext_map {
        return Ok(None);
    }

    item.meta.no_save.clear();
    let mut removed = old_ext_map;
    for mime in new_ext_map.keys() {
        removed.remove(mime);
    }
    remove_format_files(base_path, &removed);
    item.meta.ext_map = new_ext_map;

    Ok(Some(item))
}

/// Result of reading one bucket back from disk.
#[derive(Debug, Default)]
pub struct Hydrated {
    /// Recovered payloads, MIME -> bytes.
    pub payload: BTreeMap<String, Vec<u8>>,
    /// Extension map matching what is on disk, presence markers included.
    pub ext_map: BTreeMap<String, String>,
    /// Files that contributed; the watcher adds them to its watch set.
    pub files: Vec<PathBuf>,
}

/// Reads a bucket's files into payloads.
///
/// Sidecars are decoded into the payload map; oversized files, files with
/// no recognized MIME and undecodable sidecars yield a presence marker so
/// a later write pass will not delete them. Unreadable files are skipped
/// entirely.
pub fn hydrate_bucket(dir: &Path, bucket: &BaseNameBucket) -> Hydrated {
    let mut out = Hydrated::default();
    let base_path = dir.join(&bucket.base);

    for ext in &bucket.exts {
        let path = file_with_extension(&base_path, &ext.extension);

        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(SIDECAR_SUFFIX))
        {
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            match codec::decode_map(&bytes) {
                Ok(map) => {
                    out.payload.extend(map);
                    out.ext_map
                        .insert(String::new(), SIDECAR_SUFFIX.to_string());
                }
                Err(error) => {
                    warn!("unreadable sidecar {}: {error}", path.display());
                    out.ext_map.insert(String::new(), String::new());
                }
            }
            out.files.push(path);
            continue;
        }

        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.len() > SIZE_LIMIT || ext.mime.is_empty() {
            out.ext_map.insert(String::new(), String::new());
            out.files.push(path);
            continue;
        }
        let Ok(bytes) = fs::read(&path) else {
            continue;
        };
        out.payload.insert(ext.mime.clone(), bytes);
        out.ext_map.insert(ext.mime.clone(), ext.extension.clone());
        out.files.push(path);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::scanner::scan_files;
    use tempfile::tempdir;

    fn no_existing() -> HashMap<ContentHash, Vec<PathBuf>> {
        HashMap::new()
    }

    #[test]
    fn write_row_creates_files_and_ext_map() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("note");
        let item = ItemData::with_payload("text/plain", "hello");

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();
        assert_eq!(
            fs::read(temp.path().join("note.txt")).unwrap(),
            b"hello"
        );
        assert_eq!(updated.meta.ext_map.get("text/plain").unwrap(), ".txt");
    }

    #[test]
    fn unchanged_row_is_a_no_op() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("note");
        let item = ItemData::with_payload("text/plain", "hello");

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();

        let mut cache = HashCache::new(16);
        let mut existing = existing_hashes(temp.path(), &mut cache);
        assert!(write_row(&base, &updated, &mut existing).unwrap().is_none());
    }

    #[test]
    fn identical_content_elides_the_write() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, "same").unwrap();

        let mut cache = HashCache::new(16);
        let mut existing = existing_hashes(temp.path(), &mut cache);
        assert!(!save_item_file(&path, b"same", &mut existing).unwrap());
        // The entry is consumed: a second identical save would write again.
        assert!(save_item_file(&path, b"same", &mut existing).unwrap());
        assert!(save_item_file(&path, b"different", &mut existing).unwrap());
    }

    #[test]
    fn unbound_mime_lands_in_the_sidecar() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("blob");
        let item = ItemData::with_payload("application/x-custom", vec![0u8, 1, 2, 255]);

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();
        assert!(updated.meta.has_sidecar());

        let sidecar = fs::read(temp.path().join("blob_copyq.dat")).unwrap();
        let decoded = codec::decode_map(&sidecar).unwrap();
        assert_eq!(decoded["application/x-custom"], vec![0u8, 1, 2, 255]);
    }

    #[test]
    fn no_save_payloads_are_dropped_not_saved() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("copy");
        let mut item = ItemData::with_payload("text/uri-list", "file:///a.txt");
        item.meta.no_save.insert(
            "text/uri-list".into(),
            hash_bytes(b"file:///a.txt").to_vec(),
        );

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();
        assert!(updated.payload.is_empty());
        assert!(updated.meta.no_save.is_empty());
        // Saved as an empty item, not "never saved".
        assert_eq!(updated.meta.ext_map.get("").unwrap(), "");
        assert!(!temp.path().join("copy.uri").exists());
    }

    #[test]
    fn edited_no_save_payload_is_saved() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("copy");
        let mut item = ItemData::with_payload("text/plain", "edited by the user");
        item.meta
            .no_save
            .insert("text/plain".into(), hash_bytes(b"original synthesis").to_vec());

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();
        assert_eq!(updated.payload.len(), 1);
        assert!(temp.path().join("copy.txt").exists());
    }

    #[test]
    fn removed_mime_deletes_its_file() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("page");
        let mut item = ItemData::with_payload("text/plain", "text");
        item.payload.insert("text/html".into(), b"<p>".to_vec());

        let updated = write_row(&base, &item, &mut no_existing()).unwrap().unwrap();
        assert!(temp.path().join("page.html").exists());

        let mut next = updated.clone();
        next.payload.remove("text/html");
        let mut cache = HashCache::new(16);
        let mut existing = existing_hashes(temp.path(), &mut cache);
        write_row(&base, &next, &mut existing).unwrap().unwrap();

        assert!(!temp.path().join("page.html").exists());
        assert!(temp.path().join("page.txt").exists());
    }

    #[test]
    fn prior_extension_survives_rewrites() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("readme.md");
        // Loaded through a user format: the payload's file is the base name.
        let mut item = ItemData::with_payload("text/markdown", "# hi");
        item.meta
            .ext_map
            .insert("text/markdown".into(), String::new());
        item.payload.insert("text/markdown".into(), b"# changed".to_vec());

        let updated = write_row(&base, &item, &mut no_existing()).unwrap();
        // Extension map did not change shape, so metadata stays put...
        assert!(updated.is_none());
        // ...but the content write still happened, to the bare base name.
        assert_eq!(fs::read(&base).unwrap(), b"# changed");
    }

    #[test]
    fn bucket_round_trips_through_disk() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("mixed");
        let mut item = ItemData::with_payload("text/plain", "body");
        item.payload
            .insert("application/x-custom".into(), vec![9u8, 8, 7]);

        write_row(&base, &item, &mut no_existing()).unwrap().unwrap();

        let files = scanner::list_directory(temp.path()).unwrap();
        let buckets = scan_files(&files, &[]);
        assert_eq!(buckets.len(), 1);

        let hydrated = hydrate_bucket(temp.path(), &buckets[0]);
        assert_eq!(hydrated.payload["text/plain"], b"body");
        assert_eq!(hydrated.payload["application/x-custom"], vec![9u8, 8, 7]);
        assert_eq!(hydrated.ext_map.get("").unwrap(), SIDECAR_SUFFIX);
    }

    #[test]
    fn oversized_files_become_presence_markers() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.txt"), vec![0u8; (SIZE_LIMIT + 1) as usize]).unwrap();

        let files = scanner::list_directory(temp.path()).unwrap();
        let buckets = scan_files(&files, &[]);
        let hydrated = hydrate_bucket(temp.path(), &buckets[0]);

        assert!(hydrated.payload.is_empty());
        assert_eq!(hydrated.ext_map.get("").unwrap(), "");

        let mut cache = HashCache::new(16);
        assert!(cache.hash_file(&temp.path().join("big.txt")).unwrap().is_none());
    }

    #[test]
    fn corrupt_sidecar_degrades_to_presence() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("bad_copyq.dat"), b"not a blob").unwrap();

        let files = scanner::list_directory(temp.path()).unwrap();
        let buckets = scan_files(&files, &[]);
        let hydrated = hydrate_bucket(temp.path(), &buckets[0]);

        assert!(hydrated.payload.is_empty());
        assert_eq!(hydrated.ext_map.get("").unwrap(), "");
    }

    #[test]
    fn hash_cache_tracks_content_changes() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("f.txt");
        fs::write(&path, "one").unwrap();

        let mut cache = HashCache::new(4);
        let first = cache.hash_file(&path).unwrap().unwrap();
        assert_eq!(cache.hash_file(&path).unwrap().unwrap(), first);

        // Different length guarantees invalidation even on coarse mtimes.
        fs::write(&path, "longer content").unwrap();
        let second = cache.hash_file(&path).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(second, hash_bytes(b"longer content"));
    }
}
