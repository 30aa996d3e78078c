//! Directory scanning: group files on disk into base-name buckets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::sync::error::SyncError;
use crate::sync::formats::{self, FileFormat, FileMatch};

/// One matched extension of a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtMatch {
    /// Extension stripped from the file name; may be empty, in which case
    /// the base name keeps the suffix characters.
    pub extension: String,
    /// MIME type of the file content; empty for sidecars and files that are
    /// tracked by presence only.
    pub mime: String,
}

/// All recognized files sharing one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseNameBucket {
    /// The shared file stem.
    pub base: String,
    /// Extensions found for this stem, in scan order.
    pub exts: Vec<ExtMatch>,
}

/// Groups the given files into base-name buckets.
///
/// Hidden files and files no format recognizes are skipped; buckets appear
/// in first-seen order, so an oldest-first input listing yields
/// oldest-first buckets.
pub fn scan_files(paths: &[PathBuf], user_formats: &[FileFormat]) -> Vec<BaseNameBucket> {
    let mut buckets: Vec<BaseNameBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for path in paths {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') || !path.is_file() {
            continue;
        }

        let (extension, mime) = match formats::by_file(file_name, user_formats) {
            FileMatch::Found { extension, mime } => (extension, mime),
            FileMatch::Ignored | FileMatch::Unknown => continue,
        };

        let base = file_name[..file_name.len() - extension.len()].to_string();
        let slot = *index.entry(base.clone()).or_insert_with(|| {
            buckets.push(BaseNameBucket {
                base,
                exts: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].exts.push(ExtMatch { extension, mime });
    }

    buckets
}

/// Lists a directory's visible regular files, oldest first.
///
/// Modification time orders the result (ties broken by name), which makes
/// newly created files come last and, after top-insertion, appear as the
/// most recent items.
pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SyncError::FileReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((modified, path));
    }

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn files_group_by_stripped_base_name() {
        let temp = tempdir().unwrap();
        let paths = vec![
            touch(temp.path(), "note.txt"),
            touch(temp.path(), "note.png"),
            touch(temp.path(), "other.txt"),
            touch(temp.path(), "note_copyq.dat"),
        ];

        let buckets = scan_files(&paths, &[]);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].base, "note");
        assert_eq!(buckets[0].exts.len(), 3);
        assert_eq!(buckets[1].base, "other");
    }

    #[test]
    fn hidden_and_unknown_files_are_skipped() {
        let temp = tempdir().unwrap();
        let paths = vec![
            touch(temp.path(), ".hidden.txt"),
            touch(temp.path(), "binary.zzz"),
            touch(temp.path(), "kept.txt"),
        ];

        let buckets = scan_files(&paths, &[]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].base, "kept");
    }

    #[test]
    fn ignored_formats_never_become_buckets() {
        let temp = tempdir().unwrap();
        let paths = vec![touch(temp.path(), "junk.tmp")];
        let mut format = FileFormat {
            extensions: vec![".tmp".into()],
            item_mime: "-".into(),
            icon: String::new(),
        };
        format.normalize();

        assert!(scan_files(&paths, &[format]).is_empty());
    }

    #[test]
    fn user_mime_keeps_suffix_in_base() {
        let temp = tempdir().unwrap();
        let paths = vec![touch(temp.path(), "readme.md")];
        let mut format = FileFormat {
            extensions: vec![".md".into()],
            item_mime: "text/markdown".into(),
            icon: String::new(),
        };
        format.normalize();

        let buckets = scan_files(&paths, &[format]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].base, "readme.md");
        assert!(buckets[0].exts[0].extension.is_empty());
        assert_eq!(buckets[0].exts[0].mime, "text/markdown");
    }

    #[test]
    fn missing_files_produce_no_buckets() {
        let temp = tempdir().unwrap();
        let paths = vec![temp.path().join("gone.txt")];
        assert!(scan_files(&paths, &[]).is_empty());
    }

    #[test]
    fn directory_listing_is_oldest_first_and_visible_only() {
        let temp = tempdir().unwrap();
        touch(temp.path(), "older.txt");
        std::thread::sleep(std::time::Duration::from_millis(20));
        touch(temp.path(), "newer.txt");
        touch(temp.path(), ".hidden");
        fs::create_dir(temp.path().join("sub")).unwrap();

        let listed = list_directory(temp.path()).unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["older.txt", "newer.txt"]);
    }
}
