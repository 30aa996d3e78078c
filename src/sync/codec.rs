//! Key-value blob, sidecar and manifest codecs.
//!
//! The shared primitive is a deterministic length-prefixed map of
//! `(string, bytes)` entries: a big-endian `u32` entry count, then per
//! entry a length-prefixed UTF-8 key and a length-prefixed value. The
//! sidecar file is exactly one such map (MIME -> payload); the per-tab
//! manifest is a length-prefixed header string followed by one with a
//! version number and the saved-file list.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::sync::error::SyncError;

/// Header string tagging a tab manifest.
pub const MANIFEST_HEADER: &str = "CopyQ_itemsync_tab";

/// Manifest version this codec reads and writes.
pub const MANIFEST_VERSION: u32 = 1;

const KEY_VERSION: &str = "copyq_itemsync_version";
const KEY_SAVED_FILES: &str = "saved_files";

/// Upper bound for any single length field; rejects corrupt streams before
/// they turn into huge allocations.
const MAX_FIELD_LEN: u32 = 1 << 26;

/// Per-tab manifest: the files this tab owned at last save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Format version, currently [`MANIFEST_VERSION`].
    pub version: u32,
    /// Absolute paths of all saved files, in save order.
    pub saved_files: Vec<String>,
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn read_u32(input: &mut &[u8]) -> Result<u32, SyncError> {
    if input.len() < 4 {
        return Err(SyncError::SidecarDecodeFailed("truncated length field".into()));
    }
    let mut buf = [0u8; 4];
    let (head, rest) = input.split_at(4);
    buf.copy_from_slice(head);
    *input = rest;
    Ok(u32::from_be_bytes(buf))
}

fn read_bytes(input: &mut &[u8]) -> Result<Vec<u8>, SyncError> {
    let len = read_u32(input)?;
    if len > MAX_FIELD_LEN {
        return Err(SyncError::SidecarDecodeFailed(format!(
            "implausible field length {len}"
        )));
    }
    let len = len as usize;
    if input.len() < len {
        return Err(SyncError::SidecarDecodeFailed("truncated field".into()));
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(head.to_vec())
}

fn read_string(input: &mut &[u8]) -> Result<String, SyncError> {
    String::from_utf8(read_bytes(input)?)
        .map_err(|_| SyncError::SidecarDecodeFailed("key is not UTF-8".into()))
}

/// Encodes a `(string, bytes)` map. Entries are written in key order, so
/// equal maps always produce equal bytes.
pub fn encode_map(map: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, map.len() as u32);
    for (key, value) in map {
        write_bytes(&mut out, key.as_bytes());
        write_bytes(&mut out, value);
    }
    out
}

/// Decodes a map produced by [`encode_map`]. Trailing garbage is rejected.
pub fn decode_map(mut input: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, SyncError> {
    let count = read_u32(&mut input)?;
    if count > MAX_FIELD_LEN {
        return Err(SyncError::SidecarDecodeFailed(format!(
            "implausible entry count {count}"
        )));
    }
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = read_string(&mut input)?;
        let value = read_bytes(&mut input)?;
        map.insert(key, value);
    }
    if !input.is_empty() {
        return Err(SyncError::SidecarDecodeFailed("trailing data".into()));
    }
    Ok(map)
}

fn encode_string_list(items: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    write_u32(&mut out, items.len() as u32);
    for item in items {
        write_bytes(&mut out, item.as_bytes());
    }
    out
}

fn decode_string_list(mut input: &[u8]) -> Result<Vec<String>, SyncError> {
    let count = read_u32(&mut input)?;
    if count > MAX_FIELD_LEN {
        return Err(SyncError::SidecarDecodeFailed(format!(
            "implausible list length {count}"
        )));
    }
    let mut items = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        items.push(read_string(&mut input)?);
    }
    Ok(items)
}

/// Writes a manifest for the given saved files.
pub fn write_manifest(writer: &mut impl Write, saved_files: &[String]) -> std::io::Result<()> {
    let mut blob = BTreeMap::new();
    blob.insert(
        KEY_VERSION.to_string(),
        MANIFEST_VERSION.to_be_bytes().to_vec(),
    );
    blob.insert(KEY_SAVED_FILES.to_string(), encode_string_list(saved_files));

    let mut out = Vec::new();
    write_bytes(&mut out, MANIFEST_HEADER.as_bytes());
    out.extend_from_slice(&encode_map(&blob));
    writer.write_all(&out)
}

/// Reads a manifest, failing with [`SyncError::ManifestMismatch`] on any
/// header or version disagreement. Callers treat that as "tab not synced".
pub fn read_manifest(reader: &mut impl Read) -> Result<Manifest, SyncError> {
    let mut raw = Vec::new();
    reader
        .read_to_end(&mut raw)
        .map_err(|_| SyncError::ManifestMismatch)?;
    let mut input = raw.as_slice();

    let header = read_bytes(&mut input).map_err(|_| SyncError::ManifestMismatch)?;
    if header != MANIFEST_HEADER.as_bytes() {
        return Err(SyncError::ManifestMismatch);
    }

    let blob = decode_map(input).map_err(|_| SyncError::ManifestMismatch)?;
    let version = blob
        .get(KEY_VERSION)
        .and_then(|raw| <[u8; 4]>::try_from(raw.as_slice()).ok())
        .map(u32::from_be_bytes)
        .ok_or(SyncError::ManifestMismatch)?;
    if version != MANIFEST_VERSION {
        return Err(SyncError::ManifestMismatch);
    }

    let saved_files = match blob.get(KEY_SAVED_FILES) {
        Some(raw) => decode_string_list(raw).map_err(|_| SyncError::ManifestMismatch)?,
        None => Vec::new(),
    };

    Ok(Manifest {
        version,
        saved_files,
    })
}

/// Whether the stream begins with a manifest header. Consumes the reader.
pub fn has_manifest_header(reader: &mut impl Read) -> bool {
    let mut raw = [0u8; 4 + MANIFEST_HEADER.len()];
    if reader.read_exact(&mut raw).is_err() {
        return false;
    }
    let mut input = raw.as_slice();
    matches!(read_bytes(&mut input), Ok(header) if header == MANIFEST_HEADER.as_bytes())
}
