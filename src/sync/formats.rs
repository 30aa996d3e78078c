//! Extension/MIME format registry and icon hinting.
//!
//! Two lookup directions: [`by_format`] resolves a MIME type to the file
//! extension it should be saved under, [`by_file`] resolves a file name to
//! the MIME type its content represents. User-configured formats take
//! precedence over the built-in table; the built-ins are a compile-time
//! constant in match order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Suffix of the per-item sidecar file holding residual MIME payloads.
pub const SIDECAR_SUFFIX: &str = "_copyq.dat";

/// MIME type of item notes.
pub const MIME_NOTES: &str = "application/x-copyq-item-notes";
/// MIME type of plain text payloads.
pub const MIME_TEXT: &str = "text/plain";
/// MIME type of URI list payloads.
pub const MIME_URI_LIST: &str = "text/uri-list";

/// Built-in MIME -> extension table. Order is significant: the first
/// matching entry wins in both lookup directions. The final entry is the
/// sidecar sentinel (no MIME, sidecar suffix).
const BUILTIN_FORMATS: &[(&str, &str)] = &[
    (MIME_NOTES, "_note.txt"),
    ("image/bmp", ".bmp"),
    ("image/gif", ".gif"),
    ("text/html", ".html"),
    ("image/x-inkscape-svg-compressed", "_inkscape.svg"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    (MIME_TEXT, ".txt"),
    (MIME_URI_LIST, ".uri"),
    ("application/xml", ".xml"),
    ("image/svg+xml", "_xml.svg"),
    ("text/xml", ".xml"),
    ("", SIDECAR_SUFFIX),
];

/// A user-configured file format row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    /// Extensions matched by this format, each normalized to start with `.`.
    #[serde(rename = "formats")]
    pub extensions: Vec<String>,
    /// MIME type the format maps to. `-` means "ignore such files"; empty
    /// means "fall through to the built-in table".
    #[serde(rename = "itemMime", default)]
    pub item_mime: String,
    /// Icon name shown for items of this format, if any.
    #[serde(default)]
    pub icon: String,
}

impl FileFormat {
    /// A format without extensions matches nothing.
    pub fn is_valid(&self) -> bool {
        !self.extensions.is_empty()
    }

    /// Prefixes every extension with `.` where missing.
    pub fn normalize(&mut self) {
        for ext in &mut self.extensions {
            if !ext.starts_with('.') {
                ext.insert(0, '.');
            }
        }
    }
}

/// Extension to save a MIME payload under.
///
/// The user map (in practice the row's previous extension map) wins, so a
/// payload keeps the extension it was loaded from; otherwise the first
/// built-in entry for the MIME applies.
pub fn by_format(mime: &str, user_map: &BTreeMap<String, String>) -> Option<String> {
    if let Some(ext) = user_map.get(mime) {
        return Some(ext.clone());
    }
    BUILTIN_FORMATS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| (*ext).to_string())
}

/// All extensions known to the registry: user-configured first, then
/// built-in. Used by the base-name allocator to split names.
pub fn known_extensions(user_formats: &[FileFormat]) -> Vec<&str> {
    let mut exts: Vec<&str> = user_formats
        .iter()
        .flat_map(|f| f.extensions.iter().map(String::as_str))
        .collect();
    exts.extend(BUILTIN_FORMATS.iter().map(|(_, ext)| *ext));
    exts
}

/// Outcome of matching a file name against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMatch {
    /// A user format with MIME `-` matched; the file is never an item.
    Ignored,
    /// Nothing matched; the file is not recognized.
    Unknown,
    /// A format matched.
    Found {
        /// Matched extension. Empty when a user format supplied the MIME:
        /// the base name then keeps the suffix characters.
        extension: String,
        /// MIME type of the file content. Empty for the sidecar sentinel
        /// and for user extensions with no MIME binding.
        mime: String,
    },
}

/// Resolves a file name to its extension and MIME type.
///
/// User formats are tested first, in list order, by suffix match. A user
/// match with MIME `-` ignores the file; with an empty MIME it falls
/// through to the built-in table for both fields; with a concrete MIME the
/// extension is recorded as empty so the base name keeps its suffix.
pub fn by_file(file_name: &str, user_formats: &[FileFormat]) -> FileMatch {
    for format in user_formats {
        for ext in &format.extensions {
            if !file_name.ends_with(ext.as_str()) {
                continue;
            }
            if format.item_mime == "-" {
                return FileMatch::Ignored;
            }
            if format.item_mime.is_empty() {
                // Built-ins decide; an unrecognized suffix still claims the
                // file (presence only, never parsed).
                let (extension, mime) = builtin_by_file(file_name)
                    .unwrap_or((String::new(), String::new()));
                return FileMatch::Found { extension, mime };
            }
            return FileMatch::Found {
                extension: String::new(),
                mime: format.item_mime.clone(),
            };
        }
    }

    match builtin_by_file(file_name) {
        Some((extension, mime)) => FileMatch::Found { extension, mime },
        None => FileMatch::Unknown,
    }
}

fn builtin_by_file(file_name: &str) -> Option<(String, String)> {
    BUILTIN_FORMATS
        .iter()
        .find(|(_, ext)| file_name.ends_with(ext))
        .map(|(mime, ext)| ((*ext).to_string(), (*mime).to_string()))
}

/// Icon family derived from an extension or MIME prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconHint {
    /// Video content.
    Video,
    /// Audio content.
    Audio,
    /// Image content.
    Image,
    /// Archive content.
    Archive,
    /// Textual content.
    Text,
}

impl IconHint {
    /// Stable icon name for display layers.
    pub fn name(self) -> &'static str {
        match self {
            IconHint::Video => "video",
            IconHint::Audio => "audio",
            IconHint::Image => "image",
            IconHint::Archive => "archive",
            IconHint::Text => "text",
        }
    }
}

const VIDEO_EXTS: &[&str] = &["avi", "mkv", "mp4", "mpg", "mpeg", "ogv", "flv"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "ogg", "m4a"];
const IMAGE_EXTS: &[&str] = &[
    "png", "jpg", "gif", "bmp", "svg", "tga", "tiff", "psd", "xcf", "ico", "pbm", "ppm", "eps",
    "pcx", "jpx", "jp2",
];
const ARCHIVE_EXTS: &[&str] = &["zip", "7z", "tar", "rar", "arj"];
const TEXT_EXTS: &[&str] = &[
    "txt", "log", "xml", "html", "htm", "pdf", "doc", "docx", "odt", "xls", "rtf", "csv", "ppt",
];

fn is_split_rar_ext(ext: &str) -> bool {
    // Multi-part archives: r00, r01, ...
    let bytes = ext.as_bytes();
    bytes.len() == 3 && bytes[0] == b'r' && bytes[1..].iter().all(u8::is_ascii_digit)
}

fn family_of_extension(ext: &str) -> Option<IconHint> {
    if VIDEO_EXTS.contains(&ext) {
        Some(IconHint::Video)
    } else if AUDIO_EXTS.contains(&ext) {
        Some(IconHint::Audio)
    } else if IMAGE_EXTS.contains(&ext) {
        Some(IconHint::Image)
    } else if ARCHIVE_EXTS.contains(&ext) || is_split_rar_ext(ext) {
        Some(IconHint::Archive)
    } else if TEXT_EXTS.contains(&ext) {
        Some(IconHint::Text)
    } else {
        None
    }
}

/// Icon family inferred from a MIME type prefix.
pub fn icon_for_mime(mime: &str) -> Option<IconHint> {
    if mime.starts_with("video/") {
        Some(IconHint::Video)
    } else if mime.starts_with("audio/") {
        Some(IconHint::Audio)
    } else if mime.starts_with("image/") {
        Some(IconHint::Image)
    } else if mime.starts_with("text/") {
        Some(IconHint::Text)
    } else {
        None
    }
}

/// Icon for an item's base name: a matching user format's icon wins,
/// otherwise the extension after the final dot selects a family.
pub fn icon_for_base_name(base_name: &str, user_formats: &[FileFormat]) -> Option<String> {
    for format in user_formats {
        if format.extensions.iter().any(|e| base_name.ends_with(e.as_str())) {
            if !format.icon.is_empty() {
                return Some(format.icon.clone());
            }
            break;
        }
    }
    let ext = base_name.rsplit_once('.')?.1;
    family_of_extension(ext).map(|hint| hint.name().to_string())
}
